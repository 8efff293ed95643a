//! Change notification delivery.
//!
//! - [`DiscordWebhook`]: posts embeds to a webhook URL
//! - [`NotificationDispatcher`]: runs deliveries as background tasks and
//!   reports their outcome

pub mod discord;
pub mod dispatcher;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::NotificationMessage;

pub use discord::DiscordWebhook;
pub use dispatcher::{DeliveryFailure, DeliveryReport, NotificationDispatcher};

/// Destination for change notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver `message` to `channel` (a webhook URL for the Discord sink).
    async fn send(&self, channel: &str, message: &NotificationMessage) -> Result<()>;
}
