//! # Collector
//!
//! Delivery of one replay entry to the remote event network.

use super::entry::ReplayEntry;
use crate::config::ReplayConfig;
use crate::error::SendError;
use crate::http::build_client;
use flate2::write::GzEncoder;
use flate2::Compression;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::future::Future;
use std::io::Write;

/// Exact body the collector returns when it refuses an empty list.
pub const EMPTY_LIST_REJECTION: &str = "FAIL: [<ValidationError: '[] is too short'>]";

static UNKNOWN_SCHEMA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^FAIL: \[JsonValidationException\('Schema https?://[^/]+/schemas/(?P<name>.+)/(?P<version>[0-9]+) is unknown, unable to validate\.',\)\]$",
    )
    .expect("static regex is valid")
});

/// How the collector took a message it did not refuse outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    /// Rejected with [`EMPTY_LIST_REJECTION`] for a message that carries an
    /// intentionally empty list. Counts as delivered.
    EmptyPayloadRejected,
}

/// Something that can deliver replay entries.
pub trait Collector {
    fn send(&self, entry: &ReplayEntry) -> impl Future<Output = Result<Delivery, SendError>> + Send;
}

/// Build the wire envelope for an entry.
///
/// The stored message must carry `$schemaRef` and `message`. Any header it
/// carried is replaced.
pub fn build_envelope(
    entry: &ReplayEntry,
    software_name: &str,
    software_version: &str,
) -> Result<Value, SendError> {
    let schema_ref = entry
        .schema_ref()
        .ok_or_else(|| SendError::InvalidMessage("missing $schemaRef".to_string()))?;
    let body = entry
        .message
        .get("message")
        .ok_or_else(|| SendError::InvalidMessage("missing message body".to_string()))?;

    Ok(json!({
        "$schemaRef": schema_ref,
        "header": {
            "softwareName": software_name,
            "softwareVersion": software_version,
            "uploaderID": entry.uploader_id,
        },
        "message": body,
    }))
}

/// True if a rejection is the collector objecting to an empty list we meant to send.
pub fn is_benign_rejection(status: u16, body: &str, entry: &ReplayEntry) -> bool {
    if status != StatusCode::BAD_REQUEST.as_u16() || body.trim() != EMPTY_LIST_REJECTION {
        return false;
    }

    entry
        .message
        .get("message")
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .values()
                .any(|v| v.as_array().map(Vec::is_empty).unwrap_or(false))
        })
        .unwrap_or(false)
}

impl SendError {
    /// Short text suitable for a status bar.
    pub fn status_line(&self) -> String {
        match self {
            SendError::Rejected { status: 400, body } => match UNKNOWN_SCHEMA_RE.captures(body.trim()) {
                Some(caps) => format!("Unknown schema {} v{}", &caps["name"], &caps["version"]),
                None => "Validation failed".to_string(),
            },
            SendError::Rejected { status: 413, .. } => "Payload too large".to_string(),
            SendError::Rejected { status, .. } => format!("Returned {} status code", status),
            SendError::Transport(_) => "Can't connect to collector".to_string(),
            SendError::InvalidMessage(reason) => format!("Invalid message: {}", reason),
        }
    }
}

/// gzip `bytes` with the default level.
pub fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// POSTs envelopes to an HTTP collector.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: Client,
    url: String,
    software_name: String,
    software_version: String,
    gzip_min_bytes: usize,
}

impl HttpCollector {
    pub fn new(config: &ReplayConfig) -> Result<Self, SendError> {
        let client = build_client(config.timeout, &config.user_agent())?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &ReplayConfig) -> Self {
        Self {
            client,
            url: config.collector_url.clone(),
            software_name: config.software_name.clone(),
            software_version: config.software_version.clone(),
            gzip_min_bytes: config.gzip_min_bytes,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Collector for HttpCollector {
    async fn send(&self, entry: &ReplayEntry) -> Result<Delivery, SendError> {
        let envelope = build_envelope(entry, &self.software_name, &self.software_version)?;
        let encoded = serde_json::to_vec(&envelope)
            .map_err(|e| SendError::InvalidMessage(format!("unserializable: {}", e)))?;

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json; charset=utf-8");

        if encoded.len() >= self.gzip_min_bytes {
            match gzip(&encoded) {
                Ok(compressed) => {
                    request = request.header(CONTENT_ENCODING, "gzip").body(compressed);
                }
                Err(e) => {
                    log::debug!("gzip failed ({}), sending uncompressed", e);
                    request = request.body(encoded);
                }
            }
        } else {
            request = request.body(encoded);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(Delivery::Accepted);
        }

        let body = response.text().await.unwrap_or_default();
        if is_benign_rejection(status.as_u16(), &body, entry) {
            log::debug!("Collector still objects to an empty list; treating as delivered");
            return Ok(Delivery::EmptyPayloadRejected);
        }

        log::debug!(
            "Status from POST wasn't OK: status {} url {} body {:?}",
            status,
            self.url,
            body
        );
        Err(SendError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
