//! Scheduled killswitch refresh - background task for periodic reloading.
//!
//! The host fetches killswitches once at startup. This scheduler keeps the
//! active set current afterwards by calling [`RefreshService::refresh_now`] on
//! a fixed interval. A failed cycle is logged and the previous set stays
//! active until the next one.
//!
//! # Production Configuration
//!
//! The default refresh interval is 6 hours. Killswitches are an emergency
//! lever, so hosts that need faster reaction set
//! `COMMLINK_KILLSWITCH_REFRESH_SECS` instead of polling the source harder by
//! default.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::KillswitchConfig;
use crate::refresh::RefreshService;
use crate::types::now_ms;
use log::{error, info};

/// Configuration for the scheduled refresh service.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between refresh operations
    pub refresh_interval: Duration,
    /// Whether the scheduler is enabled
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(6 * 60 * 60),
            enabled: true,
        }
    }
}

impl From<&KillswitchConfig> for SchedulerConfig {
    fn from(config: &KillswitchConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval,
            enabled: config.refresh_enabled,
        }
    }
}

/// Scheduler for periodic killswitch refresh.
///
/// Runs as a background task spawned by the host after the initial fetch.
pub struct RefreshScheduler {
    /// Service doing the actual fetch and swap
    service: RefreshService,
    /// Scheduler configuration
    config: SchedulerConfig,
    /// Timestamp of the last successful refresh
    last_refresh_at: RwLock<u64>,
}

impl RefreshScheduler {
    /// Creates a new refresh scheduler.
    ///
    /// `last_refresh_at` starts at the current time: the host is expected
    /// to have loaded the set once already.
    ///
    /// # Example
    /// ```rust,no_run
    /// use std::sync::Arc;
    /// use commlink::refresh::{RefreshScheduler, RefreshService, SchedulerConfig};
    /// use commlink::ActiveKillSwitches;
    ///
    /// # async fn run() {
    /// let active = Arc::new(ActiveKillSwitches::new());
    /// let service = RefreshService::new(reqwest::Client::new(), "https://example.com/kills.json", None, active);
    /// let scheduler = Arc::new(RefreshScheduler::new(service, SchedulerConfig::default()));
    /// tokio::spawn(scheduler.start());
    /// # }
    /// ```
    pub fn new(service: RefreshService, config: SchedulerConfig) -> Self {
        Self {
            service,
            config,
            last_refresh_at: RwLock::new(now_ms()),
        }
    }

    /// Milliseconds since UNIX epoch of the last successful refresh, or
    /// creation time if none has happened yet.
    pub fn last_refresh(&self) -> u64 {
        *self.last_refresh_at.read()
    }

    pub fn service(&self) -> &RefreshService {
        &self.service
    }

    /// Starts the scheduler background task.
    ///
    /// Returns immediately when disabled. Otherwise waits one interval,
    /// refreshes, logs the outcome and repeats indefinitely.
    pub async fn start(self: Arc<Self>) {
        if !self.config.enabled {
            info!("Scheduled killswitch refresh is disabled, skipping");
            return;
        }

        info!(
            "Starting scheduled killswitch refresh from {} with {}-second interval",
            self.service.url(),
            self.config.refresh_interval.as_secs()
        );

        let mut ticker = interval(self.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // First tick completes immediately; startup already loaded the set
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.do_refresh().await;
        }
    }

    /// Executes one refresh cycle. Errors are logged and never stop the scheduler.
    pub async fn do_refresh(&self) {
        match self.service.refresh_now().await {
            Ok(stats) => {
                info!(
                    "Scheduled refresh completed: {} rules across {} ranges in {}ms",
                    stats.rules_refreshed, stats.switches_loaded, stats.duration_ms
                );
                *self.last_refresh_at.write() = stats.timestamp;
            }
            Err(e) => {
                error!("Scheduled refresh failed, keeping previous killswitches: {}", e);
            }
        }
    }
}
