// src/lambda/mod.rs

//! AWS Lambda handler for scheduled synchronizations.
//!
//! Each invocation:
//! 1. Loads configuration from `CONFIG_PATH` (secrets via `env:NAME`)
//! 2. Runs one synchronization under the run lock in `STORAGE_DIR`
//! 3. Returns a summary of the run

use std::path::PathBuf;

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::load_config;
use crate::error::Result;
use crate::pipeline::{CohortReport, SyncReport, run_sync};

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
// Only /tmp is writable inside the Lambda sandbox.
const DEFAULT_STORAGE_DIR: &str = "/tmp/timetable-crawler";

/// Lambda invocation payload.
#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    /// Specific cohort to sync (optional, syncs all if not specified)
    #[serde(default)]
    pub cohort: Option<String>,
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct SyncResponse {
    /// Whether the run completed (individual units may still have failed)
    pub success: bool,

    pub inserted: usize,

    pub replaced: usize,

    pub unchanged: usize,

    pub notifications_delivered: usize,

    pub notifications_failed: usize,

    /// Per-cohort counters
    pub cohorts: Vec<CohortReport>,

    /// Error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl From<SyncReport> for SyncResponse {
    fn from(report: SyncReport) -> Self {
        Self {
            success: true,
            inserted: report.inserted(),
            replaced: report.replaced(),
            unchanged: report.unchanged(),
            notifications_delivered: report.notifications_delivered(),
            notifications_failed: report.notifications_failed(),
            cohorts: report.cohorts,
            error: None,
            execution_time_ms: 0,
        }
    }
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<SyncRequest>,
) -> std::result::Result<SyncResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (request, _context) = event.into_parts();

    info!("Starting sync: cohort={:?}", request.cohort);

    let mut response = match run(&request).await {
        Ok(report) => SyncResponse::from(report),
        Err(e) => {
            error!("Sync failed: {}", e);
            SyncResponse {
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    };
    response.execution_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    info!(
        "Sync completed: {} inserted, {} replaced in {}ms",
        response.inserted, response.replaced, response.execution_time_ms
    );
    Ok(response)
}

async fn run(request: &SyncRequest) -> Result<SyncReport> {
    let config_path = env_path("CONFIG_PATH", DEFAULT_CONFIG_PATH);
    let storage_dir = env_path("STORAGE_DIR", DEFAULT_STORAGE_DIR);

    let config = load_config(&config_path)?;
    run_sync(&config, &storage_dir, request.cohort.as_deref()).await
}

fn env_path(name: &str, default: &str) -> PathBuf {
    std::env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Weekday};

    use crate::pipeline::NotificationWindow;

    #[test]
    fn test_sync_request_defaults() {
        let req: SyncRequest = serde_json::from_str("{}").unwrap();
        assert!(req.cohort.is_none());
    }

    #[test]
    fn test_sync_request_with_cohort() {
        let req: SyncRequest = serde_json::from_str(r#"{"cohort": "CDA"}"#).unwrap();
        assert_eq!(req.cohort.as_deref(), Some("CDA"));
    }

    #[test]
    fn test_response_sums_cohorts() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        let cohort = |name: &str, inserted, replaced| CohortReport {
            cohort: name.into(),
            authenticated: true,
            inserted,
            replaced,
            ..Default::default()
        };
        let report = SyncReport {
            today,
            target_dates: vec![today],
            window: NotificationWindow::current(today, Weekday::Thu),
            cohorts: vec![cohort("CDA", 3, 1), cohort("WIS", 2, 0)],
        };

        let response = SyncResponse::from(report);
        assert!(response.success);
        assert_eq!(response.inserted, 5);
        assert_eq!(response.replaced, 1);

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["cohorts"][1]["cohort"], "WIS");
    }
}
