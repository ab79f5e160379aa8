//! Replay driver - cooperative flush loop for a host runtime.
//!
//! The queue itself never spawns anything. A host that wants background
//! delivery spawns [`ReplayScheduler::start`] on its tokio runtime:
//!
//! 1. While the queue is empty the loop parks until the next enqueue.
//! 2. While it is not, one `flush_one` runs every `period`.
//! 3. After a failure the loop waits for the next tick and retries the same
//!    entry, indefinitely and without backoff.

use super::collector::Collector;
use super::queue::{ReplayOutcome, ReplayQueue, ReplayStats};
use crate::config::ReplaySchedulerConfig;
use crate::error::ReplayResult;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::{interval, MissedTickBehavior};

/// Owns a replay queue and feeds it to the collector on a fixed cadence.
pub struct ReplayScheduler<C> {
    queue: Arc<Mutex<ReplayQueue<C>>>,
    wake: Notify,
    config: ReplaySchedulerConfig,
    stopping: AtomicBool,
    last_status: RwLock<Option<String>>,
}

impl<C> ReplayScheduler<C>
where
    C: Collector + Send + Sync + 'static,
{
    pub fn new(queue: ReplayQueue<C>, config: ReplaySchedulerConfig) -> Self {
        Self {
            queue: Arc::new(Mutex::new(queue)),
            wake: Notify::new(),
            config,
            stopping: AtomicBool::new(false),
            last_status: RwLock::new(None),
        }
    }

    /// Shared handle to the underlying queue.
    pub fn queue(&self) -> Arc<Mutex<ReplayQueue<C>>> {
        Arc::clone(&self.queue)
    }

    /// Queue a message and wake the loop.
    pub async fn enqueue(&self, uploader_id: &str, message: Value) -> ReplayResult<()> {
        self.queue.lock().await.enqueue(uploader_id, message)?;
        self.wake.notify_one();
        Ok(())
    }

    /// Most recent status bar text, cleared once the queue drains.
    pub fn last_status(&self) -> Option<String> {
        self.last_status.read().clone()
    }

    pub async fn stats(&self) -> ReplayStats {
        self.queue.lock().await.stats()
    }

    /// Run the flush loop until [`Self::close`] is called.
    pub async fn start(self: Arc<Self>) {
        if !self.config.enabled {
            log::info!("Replay scheduler is disabled, skipping");
            return;
        }

        log::info!(
            "Starting replay scheduler with {}ms period",
            self.config.period.as_millis()
        );

        let mut ticker = interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.stopping.load(Ordering::Acquire) {
            let idle = {
                let queue = self.queue.lock().await;
                queue.is_empty() || queue.is_closed()
            };
            if idle {
                *self.last_status.write() = None;
                self.wake.notified().await;
                ticker.reset();
                continue;
            }

            ticker.tick().await;
            if self.stopping.load(Ordering::Acquire) {
                break;
            }
            self.tick().await;
        }

        log::info!("Replay scheduler stopped");
    }

    /// One delivery attempt; also usable by hosts that drive their own timer.
    pub async fn tick(&self) -> Option<ReplayOutcome> {
        let result = self.queue.lock().await.flush_one().await;
        match result {
            Ok(outcome) => {
                *self.last_status.write() = outcome.status_line();
                Some(outcome)
            }
            Err(e) => {
                log::error!("Replay flush failed: {}", e);
                *self.last_status.write() = Some(e.to_string());
                None
            }
        }
    }

    /// Stop the loop and close the queue. Unsent entries stay on disk.
    pub async fn close(&self) -> ReplayResult<()> {
        self.stopping.store(true, Ordering::Release);
        self.wake.notify_one();
        self.queue.lock().await.close()
    }
}
