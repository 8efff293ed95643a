//! AWS Lambda entry point for the timetable crawler
//!
//! Deploy with `cargo lambda build --release --features lambda`
//! and trigger it from a schedule.

use lambda_runtime::{Error as LambdaError, service_fn};
use timetable_crawler::lambda::handler;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Timetable crawler Lambda starting...");
    lambda_runtime::run(service_fn(handler)).await
}
