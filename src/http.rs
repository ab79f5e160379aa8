//! Shared reqwest client construction.

use reqwest::Client;
use std::time::Duration;

/// Build a client with a fixed request timeout.
pub fn build_client(timeout: Duration, user_agent: &str) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent.to_string())
        .build()
}
