//! # commlink Host Entry Point
//!
//! Reads `[uploader, message]` JSON lines from stdin, passes each through the
//! active killswitches and queues the survivors for replay to the collector.

use commlink::error::ReplayError;
use commlink::http::build_client;
use commlink::killswitch::fetch_with_fallback;
use commlink::refresh::{RefreshScheduler, RefreshService, SchedulerConfig};
use commlink::types::app_version;
use commlink::{active, HttpCollector, RelayConfig, ReplayEntry, ReplayQueue, ReplayScheduler};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const SEND_FEATURE: &str = "plugins.relay.send";
const EVENT_FEATURE_PREFIX: &str = "plugins.relay.event.";

/// Killswitch features guarding one message, most general first.
fn features_for(entry: &ReplayEntry) -> Vec<String> {
    let mut features = vec![SEND_FEATURE.to_string()];
    if let Some(event) = entry
        .message
        .get("message")
        .and_then(|m| m.get("event"))
        .and_then(Value::as_str)
    {
        features.push(format!("{}{}", EVENT_FEATURE_PREFIX, event));
    }
    features
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=================================================");
    println!("  commlink - Replay Queue & Killswitch Host  ");
    println!("=================================================");
    println!();

    let config = RelayConfig::from_env();
    let version = app_version();

    // Killswitches: fail open at startup, then optionally keep refreshing
    let client = build_client(config.killswitch.timeout, &config.replay.user_agent())?;
    match config.killswitch.url.as_deref() {
        Some(url) => {
            println!("Loading killswitches from {}...", url);
            let fallback = config.killswitch.fallback_url.as_deref();
            let set = fetch_with_fallback(&client, url, fallback).await;
            println!(
                "✓ {} killswitch rules active for {}",
                set.kills_for_version(&version).len(),
                version
            );
            active().replace(set);

            let service = RefreshService::from_config(client, &config.killswitch, Arc::clone(active()));
            if let Some(service) = service {
                let refresh_config = SchedulerConfig::from(&config.killswitch);
                tokio::spawn(Arc::new(RefreshScheduler::new(service, refresh_config)).start());
            }
        }
        None => println!("No killswitch source configured"),
    }
    println!();

    // Replay queue
    println!("Opening replay queue at {}...", config.replay.path.display());
    let collector = HttpCollector::new(&config.replay)?;
    let queue = match ReplayQueue::open(&config.replay, collector) {
        Ok(queue) => queue,
        Err(e @ ReplayError::Locked { .. }) => {
            eprintln!("✗ Replay queue is in use by another process: {}", e);
            return Err(e.into());
        }
        Err(e) => {
            eprintln!("✗ Failed to open replay queue: {}", e);
            return Err(e.into());
        }
    };
    println!("✓ Replay queue opened");
    println!("  - Pending entries: {}", queue.len());
    println!("  - Collector: {}", config.replay.collector_url);
    println!();

    let scheduler = Arc::new(ReplayScheduler::new(queue, config.scheduler.clone()));
    let driver = tokio::spawn(Arc::clone(&scheduler).start());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                None
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let entry = match ReplayEntry::from_line(&line) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Ignoring unparseable input line: {}", e);
                continue;
            }
        };

        let features = features_for(&entry);
        let ReplayEntry { uploader_id, mut message } = entry;
        match active().check_multiple(&mut message, &features, &version) {
            Ok(true) => continue,
            Ok(false) => scheduler.enqueue(&uploader_id, message).await?,
            Err(e) => log::error!("Dropping message, killswitch rule failed: {}", e),
        }
    }

    scheduler.close().await?;
    driver.await?;

    let stats = scheduler.stats().await;
    println!("=================================================");
    println!("  commlink Shut Down");
    println!("  - Delivered: {}", stats.delivered);
    println!("  - Still pending: {}", stats.pending);
    println!("=================================================");

    Ok(())
}
