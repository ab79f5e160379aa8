//! Fetching killswitch documents.
//!
//! Sources are `http(s)://` URLs or `file:` paths. [`fetch_and_parse`] fails
//! open: any problem yields an empty set so the host keeps its current
//! behaviour.

use super::types::KillSwitchSet;
use crate::error::{KillswitchError, KillswitchResult};
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;

fn local_path(source: &str) -> Option<PathBuf> {
    let rest = source.strip_prefix("file:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    Some(PathBuf::from(rest))
}

/// Retrieve the raw document.
pub async fn fetch_document(client: &Client, source: &str) -> KillswitchResult<Value> {
    if let Some(path) = local_path(source) {
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| KillswitchError::Read { path, source })?;
        return Ok(serde_json::from_str(&text)?);
    }

    let fetch_err = |e| KillswitchError::Fetch {
        url: source.to_string(),
        source: e,
    };

    let response = client
        .get(source)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(fetch_err)?;

    response.json::<Value>().await.map_err(fetch_err)
}

/// Fetch and parse, surfacing every failure.
pub async fn try_fetch(client: &Client, source: &str) -> KillswitchResult<KillSwitchSet> {
    let document = fetch_document(client, source).await?;
    let set = KillSwitchSet::from_document(&document)?;
    log::info!(
        "Loaded {} killswitch rules across {} version ranges from {}",
        set.rule_count(),
        set.switches.len(),
        source
    );
    Ok(set)
}

/// Try `primary`, then `fallback` if given.
pub async fn try_fetch_with_fallback(
    client: &Client,
    primary: &str,
    fallback: Option<&str>,
) -> KillswitchResult<KillSwitchSet> {
    match try_fetch(client, primary).await {
        Ok(set) => Ok(set),
        Err(e) => match fallback {
            Some(fallback) => {
                log::warn!("Killswitch fetch from {} failed ({}), trying {}", primary, e, fallback);
                try_fetch(client, fallback).await
            }
            None => Err(e),
        },
    }
}

/// Fetch and parse; an empty set on any failure.
pub async fn fetch_and_parse(client: &Client, source: &str) -> KillSwitchSet {
    fetch_with_fallback(client, source, None).await
}

/// [`fetch_and_parse`] with a fallback source.
pub async fn fetch_with_fallback(client: &Client, primary: &str, fallback: Option<&str>) -> KillSwitchSet {
    match try_fetch_with_fallback(client, primary, fallback).await {
        Ok(set) => set,
        Err(e) => {
            log::warn!("No killswitches loaded, continuing without: {}", e);
            KillSwitchSet::empty()
        }
    }
}
