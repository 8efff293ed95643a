//! Background notification delivery with an observable outcome.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::models::NotificationMessage;
use crate::notify::NotificationSink;

/// A delivery that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    pub title: String,
    pub reason: String,
}

/// Outcome of all deliveries started by a dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: Vec<DeliveryFailure>,
}

/// Starts deliveries without waiting for them.
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    tasks: JoinSet<(String, crate::error::Result<()>)>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            tasks: JoinSet::new(),
        }
    }

    /// Spawn delivery of `message` to `channel`.
    pub fn dispatch(&mut self, channel: &str, message: NotificationMessage) {
        let sink = Arc::clone(&self.sink);
        let channel = channel.to_string();
        self.tasks.spawn(async move {
            let result = sink.send(&channel, &message).await;
            (message.title, result)
        });
    }

    /// Number of deliveries not yet collected.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every started delivery and report the outcome.
    pub async fn drain(&mut self) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((title, Err(e))) => {
                    log::warn!("Notification '{}' not delivered: {}", title, e);
                    report.failed.push(DeliveryFailure {
                        title,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    log::error!("Notification task failed: {}", e);
                    report.failed.push(DeliveryFailure {
                        title: String::new(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, channel: &str, message: &NotificationMessage) -> Result<()> {
            if channel == "broken" {
                return Err(AppError::notification("channel down"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((channel.to_string(), message.title.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drain_reports_successes_and_failures() {
        let sink = Arc::new(RecordingSink::default());
        let mut dispatcher = NotificationDispatcher::new(sink.clone());

        dispatcher.dispatch("ok", NotificationMessage::new("first", "a", 0));
        dispatcher.dispatch("broken", NotificationMessage::new("second", "b", 0));
        dispatcher.dispatch("ok", NotificationMessage::new("third", "c", 0));

        let report = dispatcher.drain().await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].title, "second");
        assert!(report.failed[0].reason.contains("channel down"));
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(sink.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_drain_without_dispatch_is_empty() {
        let mut dispatcher = NotificationDispatcher::new(Arc::new(RecordingSink::default()));
        assert_eq!(dispatcher.drain().await, DeliveryReport::default());
    }
}
