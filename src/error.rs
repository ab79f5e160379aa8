//! Error taxonomy for the replay queue and the killswitch engine.

use std::path::PathBuf;
use thiserror::Error;

/// Replay queue result type alias
pub type ReplayResult<T> = std::result::Result<T, ReplayError>;

/// Killswitch result type alias
pub type KillswitchResult<T> = std::result::Result<T, KillswitchError>;

/// Local failures of the replay queue.
///
/// Network failures are not here: they come back as
/// [`crate::replay::ReplayOutcome::Failed`] and are retried on the next tick.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay file {path} I/O error: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another process holds the replay file. Callers should abort startup.
    #[error("replay file {path} is locked by another instance")]
    Locked { path: PathBuf },

    #[error("failed to serialize replay entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("replay queue is closed")]
    Closed,
}

/// Why a single delivery attempt did not succeed.
#[derive(Debug, Error)]
pub enum SendError {
    /// The collector answered with a non-success status.
    #[error("collector rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Timeout, refused connection, TLS failure and the like.
    #[error("could not reach collector: {0}")]
    Transport(#[from] reqwest::Error),

    /// The stored message can never be sent as-is.
    #[error("message cannot be sent: {0}")]
    InvalidMessage(String),
}

/// Failures while resolving a dotted field path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("cannot index array with non-integer segment {segment:?} (path {path:?})")]
    NonIntegerIndex { path: String, segment: String },

    #[error("cannot index a {kind} (path {path:?})")]
    Unindexable { path: String, kind: &'static str },
}

/// Killswitch document and evaluation failures.
#[derive(Debug, Error)]
pub enum KillswitchError {
    #[error("failed to fetch killswitches from {url}: {source}")]
    Fetch { url: String, source: reqwest::Error },

    #[error("failed to read killswitch file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("killswitch document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported killswitch schema version {0}")]
    UnsupportedSchema(u64),

    #[error("malformed killswitch document: {0}")]
    MalformedDocument(String),

    /// A rule does not fit the data it was applied to.
    #[error("failed to apply killswitch rule {pattern:?}: {source}")]
    Rule { pattern: String, source: PathError },
}
