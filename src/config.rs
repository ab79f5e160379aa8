//! Runtime configuration.
//!
//! Every section has usable defaults. [`RelayConfig::from_env`] layers
//! `COMMLINK_*` environment overrides on top of them.

use std::path::PathBuf;
use std::time::Duration;

pub const ENV_REPLAY_PATH: &str = "COMMLINK_REPLAY_PATH";
pub const ENV_COLLECTOR_URL: &str = "COMMLINK_COLLECTOR_URL";
pub const ENV_KILLSWITCH_URL: &str = "COMMLINK_KILLSWITCH_URL";
pub const ENV_KILLSWITCH_FALLBACK_URL: &str = "COMMLINK_KILLSWITCH_FALLBACK_URL";
pub const ENV_KILLSWITCH_REFRESH_SECS: &str = "COMMLINK_KILLSWITCH_REFRESH_SECS";

/// Replay queue and collector configuration
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Backing file for unsent entries
    pub path: PathBuf,

    /// Collector endpoint entries are POSTed to
    pub collector_url: String,

    /// Request timeout for one delivery
    pub timeout: Duration,

    /// Rewrite the backing file after this many removals
    pub compact_every: usize,

    /// Request bodies at least this large are gzip-compressed
    pub gzip_min_bytes: usize,

    /// `softwareName` in the envelope header
    pub software_name: String,

    /// `softwareVersion` in the envelope header
    pub software_version: String,

    /// fsync after every enqueue instead of only flushing
    pub sync_writes: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            path: PathBuf::from("./var/replay.jsonl"),
            collector_url: "http://localhost:8081/upload/".to_string(),
            timeout: Duration::from_secs(10),
            compact_every: 20,
            gzip_min_bytes: 512,
            software_name: env!("CARGO_PKG_NAME").to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            sync_writes: false,
        }
    }
}

impl ReplayConfig {
    /// User-Agent sent with collector requests.
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.software_name, self.software_version)
    }
}

/// Configuration for the replay driver.
#[derive(Debug, Clone)]
pub struct ReplaySchedulerConfig {
    /// Delay between two delivery attempts
    pub period: Duration,
    /// Whether the scheduler runs at all
    pub enabled: bool,
}

impl Default for ReplaySchedulerConfig {
    fn default() -> Self {
        Self {
            // Roughly two messages per second once send latency is counted
            period: Duration::from_millis(400),
            enabled: true,
        }
    }
}

/// Killswitch source configuration
#[derive(Debug, Clone)]
pub struct KillswitchConfig {
    /// Primary document location (`http(s)://` or `file:`)
    pub url: Option<String>,

    /// Tried when the primary fails
    pub fallback_url: Option<String>,

    /// Request timeout for one fetch
    pub timeout: Duration,

    /// Interval between scheduled refreshes
    pub refresh_interval: Duration,

    /// Whether scheduled refresh runs
    pub refresh_enabled: bool,
}

impl Default for KillswitchConfig {
    fn default() -> Self {
        Self {
            url: None,
            fallback_url: None,
            timeout: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(6 * 60 * 60),
            refresh_enabled: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub replay: ReplayConfig,
    pub scheduler: ReplaySchedulerConfig,
    pub killswitch: KillswitchConfig,
}

impl RelayConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty(ENV_REPLAY_PATH) {
            config.replay.path = PathBuf::from(path);
        }
        if let Some(url) = non_empty(ENV_COLLECTOR_URL) {
            config.replay.collector_url = url;
        }
        config.killswitch.url = non_empty(ENV_KILLSWITCH_URL);
        config.killswitch.fallback_url = non_empty(ENV_KILLSWITCH_FALLBACK_URL);

        if let Some(raw) = non_empty(ENV_KILLSWITCH_REFRESH_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.killswitch.refresh_enabled = false,
                Ok(secs) => {
                    config.killswitch.refresh_interval = Duration::from_secs(secs);
                    config.killswitch.refresh_enabled = true;
                }
                Err(_) => log::warn!("Ignoring {}={:?}: not a number", ENV_KILLSWITCH_REFRESH_SECS, raw),
            }
        }

        config
    }
}
