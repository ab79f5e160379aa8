//! Replay entries and their on-disk line format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One queued message: who uploads it and what is uploaded.
///
/// Stored as a JSON array `[uploader_id, message]` on a single line, and
/// serialized with the same shape everywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "(String, Value)", from = "(String, Value)")]
pub struct ReplayEntry {
    pub uploader_id: String,
    pub message: Value,
}

impl ReplayEntry {
    pub fn new(uploader_id: impl Into<String>, message: Value) -> Self {
        Self {
            uploader_id: uploader_id.into(),
            message,
        }
    }

    /// Serialize to a single line, without the trailing newline.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&(&self.uploader_id, &self.message))
    }

    /// Parse a stored line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }

    /// `$schemaRef` of the message, if present.
    pub fn schema_ref(&self) -> Option<&str> {
        self.message.get("$schemaRef").and_then(Value::as_str)
    }
}

impl From<(String, Value)> for ReplayEntry {
    fn from((uploader_id, message): (String, Value)) -> Self {
        Self {
            uploader_id,
            message,
        }
    }
}

impl From<ReplayEntry> for (String, Value) {
    fn from(entry: ReplayEntry) -> Self {
        (entry.uploader_id, entry.message)
    }
}
