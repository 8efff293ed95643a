//! Change events and the messages they render to.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::utils::french::long_day;

/// Embed title limit of the webhook channel.
pub const TITLE_LIMIT: usize = 256;
/// Embed description limit of the webhook channel.
pub const DESCRIPTION_LIMIT: usize = 4096;

const MODIFIED_TITLE: &str = "Modification d'un horaire !";
const SCHEDULED_TITLE: &str = "Nouvel événement programmé pour la semaine prochaine";

/// A change worth announcing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Stored slots were replaced by a new time range.
    Modified {
        date: NaiveDate,
        /// `(start, end)` of each replaced entry
        previous: Vec<(String, String)>,
        start: String,
        end: String,
    },
    /// A new slot appeared inside the notification window.
    Scheduled { date: NaiveDate },
}

impl ChangeEvent {
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Modified { date, .. } | Self::Scheduled { date } => *date,
        }
    }

    /// Render the event into a channel message.
    pub fn to_message(&self, color: u32) -> NotificationMessage {
        match self {
            Self::Modified {
                date,
                previous,
                start,
                end,
            } => {
                let old = previous
                    .iter()
                    .map(|(s, e)| format!("{s} à {e}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                NotificationMessage::new(
                    MODIFIED_TITLE,
                    format!(
                        "Le {} de {} => {} à {}",
                        long_day(*date),
                        old,
                        start,
                        end
                    ),
                    color,
                )
            }
            Self::Scheduled { date } => NotificationMessage::new(
                SCHEDULED_TITLE,
                format!(
                    "Un nouvel événement a été ajouté pour le {}.",
                    long_day(*date)
                ),
                color,
            ),
        }
    }
}

/// Structured message handed to a notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub title: String,
    pub description: String,
    pub color: u32,
}

impl NotificationMessage {
    /// Build a message, truncating fields to the channel limits.
    pub fn new(title: impl AsRef<str>, description: impl AsRef<str>, color: u32) -> Self {
        Self {
            title: truncate_graphemes(title.as_ref(), TITLE_LIMIT),
            description: truncate_graphemes(description.as_ref(), DESCRIPTION_LIMIT),
            color,
        }
    }
}

fn truncate_graphemes(text: &str, limit: usize) -> String {
    text.graphemes(true).take(limit).collect()
}
