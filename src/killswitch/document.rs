//! # Killswitch Documents
//!
//! Wire format of the remote killswitch file:
//!
//! ```json
//! {
//!   "version": 2,
//!   "last_updated": "2024-01-01",
//!   "kill_switches": [
//!     {
//!       "version": ">=1.0.0, <1.4.0",
//!       "kills": [
//!         {"match": "plugins.relay.send", "reason": "collector outage"},
//!         {"match": "plugins.relay.event.*", "reason": "leaks cargo",
//!          "redact_fields": ["cargo"], "delete_fields": ["rank.0"],
//!          "set_fields": {"odyssey": false}}
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Schema 1 documents carry `kills` as an object mapping patterns to reasons
//! and are upgraded on load. Entries that do not parse are skipped with a
//! warning; the rest of the document still loads.

use super::types::{KillSwitchSet, KillSwitches, SingleKill, VersionRange};
use crate::error::{KillswitchError, KillswitchResult};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Schema version this crate reads natively.
pub const SCHEMA_VERSION: u64 = 2;

#[derive(Debug, Deserialize)]
struct RawKill {
    #[serde(rename = "match")]
    pattern: String,
    reason: String,
    #[serde(default)]
    set_fields: Option<Map<String, Value>>,
    #[serde(default)]
    redact_fields: Option<Vec<String>>,
    #[serde(default)]
    delete_fields: Option<Vec<String>>,
}

impl From<RawKill> for SingleKill {
    fn from(raw: RawKill) -> Self {
        SingleKill {
            pattern: raw.pattern,
            reason: raw.reason,
            set_fields: raw.set_fields.unwrap_or_default(),
            redact_fields: raw.redact_fields.unwrap_or_default(),
            delete_fields: raw.delete_fields.unwrap_or_default(),
        }
    }
}

impl KillSwitchSet {
    /// Parse a document from text.
    pub fn parse(text: &str) -> KillswitchResult<Self> {
        let document: Value = serde_json::from_str(text)?;
        Self::from_document(&document)
    }

    /// Build a set from a parsed document.
    ///
    /// The whole document is rejected only if its envelope is wrong: not an
    /// object, no integer `version`, an unknown schema, or no `kill_switches`
    /// array.
    pub fn from_document(document: &Value) -> KillswitchResult<Self> {
        let root = document
            .as_object()
            .ok_or_else(|| KillswitchError::MalformedDocument("document is not an object".to_string()))?;

        let schema_version = root
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| KillswitchError::MalformedDocument("missing integer version".to_string()))?;

        let entries = root
            .get("kill_switches")
            .and_then(Value::as_array)
            .ok_or_else(|| KillswitchError::MalformedDocument("missing kill_switches array".to_string()))?;

        let switches = match schema_version {
            1 => {
                log::info!("Upgrading schema 1 killswitch document");
                parse_entries(entries, parse_v1_kills)
            }
            SCHEMA_VERSION => parse_entries(entries, parse_v2_kills),
            other => return Err(KillswitchError::UnsupportedSchema(other)),
        };

        let last_updated = root
            .get("last_updated")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            schema_version,
            last_updated,
            switches,
        })
    }
}

fn parse_entries(entries: &[Value], parse_kills: fn(&Value, &mut KillSwitches, usize)) -> Vec<KillSwitches> {
    let mut switches = Vec::with_capacity(entries.len());

    for (idx, entry) in entries.iter().enumerate() {
        let Some(raw_range) = entry.get("version").and_then(Value::as_str) else {
            log::warn!("Skipping killswitch entry {}: no version range", idx);
            continue;
        };
        let range = match VersionRange::parse(raw_range) {
            Ok(range) => range,
            Err(e) => {
                log::warn!("Skipping killswitch entry {}: bad range {:?}: {}", idx, raw_range, e);
                continue;
            }
        };
        let Some(kills) = entry.get("kills") else {
            log::warn!("Skipping killswitch entry {}: no kills", idx);
            continue;
        };

        let mut parsed = KillSwitches::new(range);
        parse_kills(kills, &mut parsed, idx);
        switches.push(parsed);
    }

    switches
}

fn parse_v2_kills(kills: &Value, into: &mut KillSwitches, idx: usize) {
    let Some(kills) = kills.as_array() else {
        log::warn!("Killswitch entry {}: kills is not an array", idx);
        return;
    };

    for (kill_idx, kill) in kills.iter().enumerate() {
        match RawKill::deserialize(kill) {
            Ok(raw) => into.insert(raw.into()),
            Err(e) => log::warn!("Skipping kill {} of entry {}: {}", kill_idx, idx, e),
        }
    }
}

fn parse_v1_kills(kills: &Value, into: &mut KillSwitches, idx: usize) {
    let Some(kills) = kills.as_object() else {
        log::warn!("Killswitch entry {}: schema 1 kills is not an object", idx);
        return;
    };

    for (pattern, reason) in kills {
        match reason.as_str() {
            Some(reason) => into.insert(SingleKill::new(pattern.clone(), reason)),
            None => log::warn!("Skipping kill {:?} of entry {}: reason is not a string", pattern, idx),
        }
    }
}
