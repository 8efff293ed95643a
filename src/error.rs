// src/error.rs

//! Unified error handling for the timetable crawler.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Regular expression failed to compile
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Portal session could not be acquired
    #[error("Authentication failed for cohort {cohort}: {message}")]
    Authentication { cohort: String, message: String },

    /// A timetable page could not be fetched
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// Reading stored entries failed
    #[error("Store read error: {0}")]
    StoreRead(String),

    /// Deleting or upserting stored entries failed
    #[error("Store write error: {0}")]
    StoreWrite(String),

    /// Notification delivery failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// Another run holds the run lock (file path or lease name)
    #[error("Another run is in progress (lock {0})")]
    RunInProgress(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an authentication error for a cohort.
    pub fn authentication(cohort: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Authentication {
            cohort: cohort.into(),
            message: message.to_string(),
        }
    }

    /// Create a fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn store_read(message: impl fmt::Display) -> Self {
        Self::StoreRead(message.to_string())
    }

    pub fn store_write(message: impl fmt::Display) -> Self {
        Self::StoreWrite(message.to_string())
    }

    pub fn notification(message: impl fmt::Display) -> Self {
        Self::Notification(message.to_string())
    }
}
