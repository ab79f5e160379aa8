//! # Replay Module - durable outbound telemetry
//!
//! Outbound messages are written to a locked, line-per-entry file before any
//! network I/O happens, then replayed oldest-first to a remote collector:
//! - `entry`: the `[uploader_id, message]` line format
//! - `file`: the locked backing file and its compaction
//! - `collector`: envelope building and HTTP delivery
//! - `queue`: enqueue / flush_one / compact / close
//! - `scheduler`: optional flush loop for a tokio host

pub mod collector;
pub mod entry;
pub mod file;
pub mod queue;
pub mod scheduler;

pub use collector::{Collector, Delivery, HttpCollector, EMPTY_LIST_REJECTION};
pub use entry::ReplayEntry;
pub use file::{read_entries, ReplayFileContents, ReplayLog};
pub use queue::{ReplayOutcome, ReplayQueue, ReplayStats};
pub use scheduler::ReplayScheduler;
