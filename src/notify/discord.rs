//! Discord webhook sink.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::NotificationMessage;
use crate::notify::NotificationSink;
use crate::utils::http::create_async_client;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    embeds: [Embed<'a>; 1],
}

#[derive(Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
}

/// Sends each message as a single embed.
pub struct DiscordWebhook {
    client: Client,
}

impl DiscordWebhook {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: create_async_client(user_agent, timeout_secs)?,
        })
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhook {
    async fn send(&self, channel: &str, message: &NotificationMessage) -> Result<()> {
        let payload = WebhookPayload {
            embeds: [Embed {
                title: &message.title,
                description: &message.description,
                color: message.color,
            }],
        };

        let response = self
            .client
            .post(channel)
            .json(&payload)
            .send()
            .await
            .map_err(AppError::notification)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::notification(format!("webhook returned {status}: {body}")));
        }
        Ok(())
    }
}
