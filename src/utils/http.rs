// src/utils/http.rs

//! HTTP client utilities.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::redirect::Policy;

use crate::error::Result;
use crate::models::PortalConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(user_agent: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

/// Create a client that records cookies into `jar` and follows login redirects.
pub fn create_session_client(config: &PortalConfig, jar: Arc<Jar>) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(Policy::limited(config.max_redirects))
        .cookie_provider(jar)
        .build()?;
    Ok(client)
}
