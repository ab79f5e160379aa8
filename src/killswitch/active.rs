//! The process-wide active killswitch set.
//!
//! Held as an immutable snapshot behind an `Arc`. Readers take one snapshot
//! per call; a refresh swaps in a new set wholesale and never edits the old one.

use super::types::KillSwitchSet;
use crate::error::KillswitchResult;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use semver::Version;
use serde_json::Value;
use std::sync::Arc;

static ACTIVE: Lazy<Arc<ActiveKillSwitches>> = Lazy::new(|| Arc::new(ActiveKillSwitches::new()));

/// The active set used by call sites that do not hold their own.
pub fn active() -> &'static Arc<ActiveKillSwitches> {
    &ACTIVE
}

/// Swappable holder for the current [`KillSwitchSet`].
#[derive(Debug, Default)]
pub struct ActiveKillSwitches {
    current: RwLock<Arc<KillSwitchSet>>,
}

impl ActiveKillSwitches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(set: KillSwitchSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// Current set; stays valid even if a refresh replaces it meanwhile.
    pub fn snapshot(&self) -> Arc<KillSwitchSet> {
        Arc::clone(&self.current.read())
    }

    /// Install `set` and return the one it replaced.
    pub fn replace(&self, set: KillSwitchSet) -> Arc<KillSwitchSet> {
        let next = Arc::new(set);
        std::mem::replace(&mut *self.current.write(), next)
    }

    /// Drop all active rules.
    pub fn clear(&self) {
        self.replace(KillSwitchSet::empty());
    }

    pub fn is_disabled(&self, feature_id: &str, version: &Version) -> bool {
        self.snapshot().is_disabled(feature_id, version)
    }

    pub fn get_reason(&self, feature_id: &str, version: &Version) -> String {
        self.snapshot().get_reason(feature_id, version).to_string()
    }

    /// [`KillSwitchSet::check`] against the current snapshot.
    pub fn check(&self, feature_id: &str, data: &mut Value, version: &Version) -> KillswitchResult<bool> {
        self.snapshot().check(feature_id, data, version)
    }

    /// [`KillSwitchSet::check_multiple`] against one snapshot for all features.
    pub fn check_multiple<S: AsRef<str>>(
        &self,
        data: &mut Value,
        feature_ids: &[S],
        version: &Version,
    ) -> KillswitchResult<bool> {
        self.snapshot().check_multiple(data, feature_ids, version)
    }
}
