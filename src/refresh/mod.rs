//! Killswitch refresh - reload the active set from its source.
//!
//! Provides two refresh mechanisms:
//! 1. **On-demand refresh** (RefreshService): called by the host when it wants fresh rules
//! 2. **Scheduled refresh** (RefreshScheduler): periodic background task (6-hour default)

pub mod scheduler;
pub mod service;

pub use scheduler::{RefreshScheduler, SchedulerConfig};
pub use service::{RefreshService, RefreshStats};
