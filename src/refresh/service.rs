//! On-demand killswitch refresh.
//!
//! Fetches the document (primary, then fallback) and swaps it into the
//! active holder. A failed refresh leaves the previous set in place.

use crate::config::KillswitchConfig;
use crate::error::KillswitchResult;
use crate::killswitch::fetch::try_fetch_with_fallback;
use crate::killswitch::ActiveKillSwitches;
use crate::types::now_ms;
use reqwest::Client;
use std::sync::Arc;

/// Statistics from a refresh operation.
#[derive(Debug, Clone)]
pub struct RefreshStats {
    /// Version ranges in the new set
    pub switches_loaded: usize,
    /// Rules across all ranges
    pub rules_refreshed: usize,
    /// Duration of refresh operation in milliseconds
    pub duration_ms: u64,
    /// Timestamp of refresh
    pub timestamp: u64,
}

/// Killswitch refresh service.
#[derive(Debug, Clone)]
pub struct RefreshService {
    client: Client,
    url: String,
    fallback_url: Option<String>,
    active: Arc<ActiveKillSwitches>,
}

impl RefreshService {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        fallback_url: Option<String>,
        active: Arc<ActiveKillSwitches>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            fallback_url,
            active,
        }
    }

    /// Service for `config`, or `None` when no source is configured.
    pub fn from_config(client: Client, config: &KillswitchConfig, active: Arc<ActiveKillSwitches>) -> Option<Self> {
        let url = config.url.clone()?;
        Some(Self::new(client, url, config.fallback_url.clone(), active))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn active(&self) -> &Arc<ActiveKillSwitches> {
        &self.active
    }

    /// Fetch now and install the result.
    ///
    /// On error the active set is not touched.
    pub async fn refresh_now(&self) -> KillswitchResult<RefreshStats> {
        let start = now_ms();

        let set = try_fetch_with_fallback(&self.client, &self.url, self.fallback_url.as_deref()).await?;
        let switches_loaded = set.switches.len();
        let rules_refreshed = set.rule_count();

        self.active.replace(set);

        Ok(RefreshStats {
            switches_loaded,
            rules_refreshed,
            duration_ms: now_ms().saturating_sub(start),
            timestamp: now_ms(),
        })
    }
}
