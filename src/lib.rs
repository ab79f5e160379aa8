//! # commlink
//!
//! Backend plumbing for a companion host:
//! - **replay**: durable at-least-once queue for outbound telemetry, backed by
//!   a locked line-per-entry file and replayed to a remote collector.
//! - **killswitch**: remotely fetched rules that veto or sanitize features at
//!   runtime, keyed by running version.
//! - **refresh**: on-demand and scheduled reloading of the active killswitch set.
//!
//! Neither mechanism spawns tasks by itself. The schedulers in `replay` and
//! `refresh` are drivers a host may spawn on its own runtime.

pub mod config;
pub mod error;
pub mod http;
pub mod killswitch;
pub mod refresh;
pub mod replay;
pub mod types;

pub use config::{KillswitchConfig, RelayConfig, ReplayConfig, ReplaySchedulerConfig};
pub use error::{KillswitchError, PathError, ReplayError, SendError};
pub use killswitch::{active, ActiveKillSwitches, KillSwitchSet, SingleKill};
pub use refresh::{RefreshScheduler, RefreshService, RefreshStats};
pub use replay::{
    Collector, Delivery, HttpCollector, ReplayEntry, ReplayOutcome, ReplayQueue, ReplayScheduler,
};
