//! # Killswitches
//!
//! Remotely published rules that veto or sanitize features of a running
//! version. A document is fetched (see [`fetch`]), parsed into a
//! [`KillSwitchSet`] (see [`document`]) and installed into an
//! [`ActiveKillSwitches`] holder; call sites then ask
//! [`KillSwitchSet::check`] before doing the guarded work.

pub mod active;
pub mod document;
pub mod fetch;
pub mod path;
pub mod types;

pub use active::{active, ActiveKillSwitches};
pub use document::SCHEMA_VERSION;
pub use fetch::{fetch_and_parse, fetch_document, fetch_with_fallback, try_fetch, try_fetch_with_fallback};
pub use path::{apply_path, delete_path, redact_path, set_path, FieldOp, REDACTED};
pub use types::{pattern_matches, Disabled, KillSwitchSet, KillSwitches, SingleKill, VersionRange};
