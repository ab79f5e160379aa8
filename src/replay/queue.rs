//! # Replay Queue
//!
//! At-least-once delivery of outbound messages. Entries are persisted on
//! enqueue and removed only once the collector takes them (or once they are
//! known to be unsendable).

use super::collector::{Collector, Delivery};
use super::entry::ReplayEntry;
use super::file::ReplayLog;
use crate::config::ReplayConfig;
use crate::error::{ReplayError, ReplayResult, SendError};
use serde_json::Value;

/// Result of one [`ReplayQueue::flush_one`] call.
#[derive(Debug)]
pub enum ReplayOutcome {
    /// Nothing queued
    Idle,
    /// The collector accepted the oldest entry
    Delivered { remaining: usize },
    /// The collector refused a deliberately empty list; dropped as delivered
    Benign { remaining: usize },
    /// The oldest entry could never be sent and was dropped
    Discarded { remaining: usize, reason: String },
    /// Delivery failed; the entry stays at the front for the next tick
    Failed(SendError),
}

impl ReplayOutcome {
    /// Whether the host should schedule another `flush_one` right away.
    pub fn should_continue(&self) -> bool {
        match self {
            ReplayOutcome::Delivered { remaining }
            | ReplayOutcome::Benign { remaining }
            | ReplayOutcome::Discarded { remaining, .. } => *remaining > 0,
            ReplayOutcome::Idle | ReplayOutcome::Failed(_) => false,
        }
    }

    /// Status bar text for this outcome, if any.
    pub fn status_line(&self) -> Option<String> {
        match self {
            ReplayOutcome::Failed(e) => Some(e.status_line()),
            ReplayOutcome::Delivered { remaining } | ReplayOutcome::Benign { remaining }
                if *remaining > 0 =>
            {
                Some(format!("Sending data [{}]", remaining))
            }
            _ => None,
        }
    }
}

/// Replay statistics since open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub pending: usize,
    pub delivered: u64,
    pub benign: u64,
    pub discarded: u64,
    pub failed: u64,
    pub compactions: u64,
}

/// Durable FIFO of outbound messages bound to one collector.
///
/// Not thread-safe by itself: callers that share it wrap it in a mutex
/// (see [`super::ReplayScheduler`]).
pub struct ReplayQueue<C> {
    log: ReplayLog,
    collector: C,
    compact_every: usize,
    removed_since_compaction: usize,
    stats: ReplayStats,
}

impl<C: Collector> ReplayQueue<C> {
    /// Lock and load the replay file.
    ///
    /// [`crate::ReplayError::Locked`] means another instance owns the file;
    /// the host should abort this subsystem rather than retry.
    pub fn open(config: &ReplayConfig, collector: C) -> ReplayResult<Self> {
        let log = ReplayLog::open(&config.path, config.sync_writes)?;
        let stats = ReplayStats {
            pending: log.len(),
            ..Default::default()
        };

        Ok(Self {
            log,
            collector,
            compact_every: config.compact_every.max(1),
            removed_since_compaction: 0,
            stats,
        })
    }

    /// Queue a message. It is on disk when this returns; nothing is sent.
    pub fn enqueue(&mut self, uploader_id: &str, message: Value) -> ReplayResult<()> {
        let line = ReplayEntry::new(uploader_id, message).to_line()?;
        self.log.push(line)?;
        self.stats.pending = self.log.len();
        Ok(())
    }

    /// Try to deliver the oldest entry.
    ///
    /// Network and collector failures come back as [`ReplayOutcome::Failed`];
    /// `Err` is reserved for local file problems and a closed queue.
    pub async fn flush_one(&mut self) -> ReplayResult<ReplayOutcome> {
        if !self.log.is_open() {
            return Err(ReplayError::Closed);
        }
        let Some(line) = self.log.front() else {
            return Ok(ReplayOutcome::Idle);
        };

        let entry = match ReplayEntry::from_line(line) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Discarding unparseable replay line {:?}: {}", line, e);
                let reason = format!("unparseable: {}", e);
                return self.discard_front(reason);
            }
        };

        match self.collector.send(&entry).await {
            Ok(delivery) => {
                self.log.pop_front();
                match delivery {
                    Delivery::Accepted => self.stats.delivered += 1,
                    Delivery::EmptyPayloadRejected => self.stats.benign += 1,
                }
                self.after_removal()?;
                let remaining = self.log.len();
                log::debug!("Delivered entry for {}, {} remaining", entry.uploader_id, remaining);
                Ok(match delivery {
                    Delivery::Accepted => ReplayOutcome::Delivered { remaining },
                    Delivery::EmptyPayloadRejected => ReplayOutcome::Benign { remaining },
                })
            }
            Err(SendError::InvalidMessage(reason)) => {
                log::warn!("Discarding replay entry for {}: {}", entry.uploader_id, reason);
                self.discard_front(reason)
            }
            Err(e) => {
                self.stats.failed += 1;
                match &e {
                    SendError::Rejected { .. } => log::warn!("Failed sending: {}", e),
                    _ => log::debug!("Failed sending: {}", e),
                }
                Ok(ReplayOutcome::Failed(e))
            }
        }
    }

    /// Rewrite the backing file to hold exactly the pending entries.
    pub fn compact(&mut self) -> ReplayResult<()> {
        self.log.compact()?;
        self.removed_since_compaction = 0;
        self.stats.compactions += 1;
        Ok(())
    }

    /// Release the file. Pending entries stay on disk for the next open.
    pub fn close(&mut self) -> ReplayResult<()> {
        self.log.close()
    }

    pub fn is_closed(&self) -> bool {
        !self.log.is_open()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Pending entries, oldest first. Unparseable lines are skipped.
    pub fn pending(&self) -> impl Iterator<Item = ReplayEntry> + '_ {
        self.log.lines().filter_map(|l| ReplayEntry::from_line(l).ok())
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats.clone()
    }

    pub fn collector(&self) -> &C {
        &self.collector
    }

    fn discard_front(&mut self, reason: String) -> ReplayResult<ReplayOutcome> {
        self.log.pop_front();
        self.stats.discarded += 1;
        self.after_removal()?;
        Ok(ReplayOutcome::Discarded {
            remaining: self.log.len(),
            reason,
        })
    }

    fn after_removal(&mut self) -> ReplayResult<()> {
        self.removed_since_compaction += 1;
        self.stats.pending = self.log.len();
        if self.removed_since_compaction >= self.compact_every || self.log.is_empty() {
            self.compact()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Collector that replays scripted outcomes and records what it saw.
    #[derive(Default)]
    struct Scripted {
        script: Mutex<VecDeque<Result<Delivery, SendError>>>,
        seen: Mutex<Vec<ReplayEntry>>,
    }

    impl Collector for Scripted {
        async fn send(&self, entry: &ReplayEntry) -> Result<Delivery, SendError> {
            self.seen.lock().push(entry.clone());
            self.script.lock().pop_front().unwrap_or(Ok(Delivery::Accepted))
        }
    }

    fn config(dir: &TempDir) -> ReplayConfig {
        ReplayConfig {
            path: dir.path().join("replay.jsonl"),
            compact_every: 3,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_idle_when_empty() {
        let dir = TempDir::new().unwrap();
        let mut queue = ReplayQueue::open(&config(&dir), Scripted::default()).unwrap();
        let outcome = queue.flush_one().await.unwrap();
        assert!(matches!(outcome, ReplayOutcome::Idle));
        assert!(!outcome.should_continue());
    }

    #[tokio::test]
    async fn test_failure_keeps_entry_at_front() {
        let dir = TempDir::new().unwrap();
        let collector = Scripted::default();
        collector.script.lock().push_back(Err(SendError::Rejected {
            status: 500,
            body: "down".to_string(),
        }));
        let mut queue = ReplayQueue::open(&config(&dir), collector).unwrap();
        queue.enqueue("a", json!({"n": 1})).unwrap();
        queue.enqueue("b", json!({"n": 2})).unwrap();

        let outcome = queue.flush_one().await.unwrap();
        assert!(matches!(outcome, ReplayOutcome::Failed(_)));
        assert!(!outcome.should_continue());
        assert_eq!(outcome.status_line().as_deref(), Some("Returned 500 status code"));
        assert_eq!(queue.len(), 2);

        // Next tick retries the same entry
        let outcome = queue.flush_one().await.unwrap();
        assert!(matches!(outcome, ReplayOutcome::Delivered { remaining: 1 }));
        let seen = queue.collector().seen.lock();
        assert_eq!(seen[0].uploader_id, "a");
        assert_eq!(seen[1].uploader_id, "a");
    }

    #[tokio::test]
    async fn test_invalid_message_is_discarded() {
        let dir = TempDir::new().unwrap();
        let collector = Scripted::default();
        collector
            .script
            .lock()
            .push_back(Err(SendError::InvalidMessage("missing $schemaRef".to_string())));
        let mut queue = ReplayQueue::open(&config(&dir), collector).unwrap();
        queue.enqueue("a", json!({})).unwrap();

        let outcome = queue.flush_one().await.unwrap();
        assert!(matches!(outcome, ReplayOutcome::Discarded { remaining: 0, .. }));
        assert_eq!(queue.stats().discarded, 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_compaction_cadence() {
        let dir = TempDir::new().unwrap();
        let mut queue = ReplayQueue::open(&config(&dir), Scripted::default()).unwrap();
        for i in 0..7 {
            queue.enqueue("a", json!({"n": i})).unwrap();
        }

        for _ in 0..2 {
            queue.flush_one().await.unwrap();
        }
        assert_eq!(queue.stats().compactions, 0);

        queue.flush_one().await.unwrap();
        assert_eq!(queue.stats().compactions, 1);

        // Draining the queue always compacts, even off-cadence
        for _ in 0..4 {
            queue.flush_one().await.unwrap();
        }
        assert!(queue.is_empty());
        assert_eq!(queue.stats().compactions, 3);
        assert_eq!(std::fs::read_to_string(dir.path().join("replay.jsonl")).unwrap(), "");
    }

    #[tokio::test]
    async fn test_flush_after_close_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut queue = ReplayQueue::open(&config(&dir), Scripted::default()).unwrap();
        queue.close().unwrap();
        assert!(queue.is_closed());
        assert!(matches!(
            queue.flush_one().await,
            Err(ReplayError::Closed)
        ));
    }
}
