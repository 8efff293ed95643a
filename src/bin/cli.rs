//! Timetable Crawler CLI
//!
//! Local execution entry point. For AWS Lambda, use `timetable-crawler-lambda`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use timetable_crawler::{
    config::load_config,
    error::{AppError, Result},
    models::{Config, StoreConfig},
    pipeline::{self, NotificationWindow, target_dates, today_in},
    storage::{LocalStorage, open_store},
    utils::french::long_day,
};

/// Timetable Crawler - cohort schedule change tracker
#[derive(Parser, Debug)]
#[command(
    name = "timetable-crawler",
    version,
    about = "Scrapes cohort timetables and announces schedule changes"
)]
struct Cli {
    /// Path to storage directory containing config.toml and local data
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, reconcile and store the upcoming timetable weeks
    Sync {
        /// Only sync this cohort
        #[arg(long)]
        cohort: Option<String>,
    },

    /// Validate the configuration file
    Validate,

    /// Show the dates the next sync would fetch and the notification window
    Targets,

    /// List stored entries for a date
    Show {
        /// Date to list (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },

    /// Show storage and configuration info
    Info,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.storage_dir.join("config.toml");
    let loaded = load_config(&config_path);
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    match cli.command {
        Command::Sync { cohort } => {
            let config = loaded?;
            log::info!("Loaded configuration from {}", config_path.display());

            let report = pipeline::run_sync(&config, &cli.storage_dir, cohort.as_deref()).await?;
            for cohort in report.cohorts.iter().filter(|c| !c.is_clean()) {
                log::warn!(
                    "Cohort {} incomplete: error={:?}, {} date(s) failed, {} read / {} write failure(s), {} notification(s) lost",
                    cohort.cohort,
                    cohort.error,
                    cohort.dates_failed,
                    cohort.read_failures,
                    cohort.write_failures,
                    cohort.notifications.failed.len()
                );
            }
            log::info!("Sync complete!");
        }

        Command::Validate => {
            log::info!("Validating {}...", config_path.display());
            let config = loaded.inspect_err(|e| log::error!("Config validation failed: {}", e))?;
            log::info!(
                "✓ Config OK ({} cohorts: {})",
                config.cohorts.len(),
                config
                    .cohorts
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Command::Targets => {
            let config = loaded.unwrap_or_else(|e| {
                log::warn!("{}. Using defaults.", e);
                Config::default()
            });
            let schedule = &config.schedule;
            let today = today_in(schedule.tz()?);

            println!("Today ({}): {}", schedule.timezone, today);
            for date in target_dates(
                today,
                schedule.target_weekday,
                schedule.horizon_months,
                schedule.occurrences,
            ) {
                println!("  {}  {}", date, long_day(date));
            }
            let window = NotificationWindow::current(today, schedule.notification_weekday);
            println!(
                "Notification window: {} (inclusive) to {} (exclusive)",
                window.start, window.end
            );
        }

        Command::Show { date } => {
            let config = loaded?;
            let store = open_store(&config, &cli.storage_dir)?;
            let mut entries = store.read_by_date(date).await?;
            entries.sort_by(|a, b| {
                (&a.group, &a.start_time, &a.end_time).cmp(&(&b.group, &b.start_time, &b.end_time))
            });

            println!("{} ({} entries)", long_day(date), entries.len());
            for e in &entries {
                println!(
                    "  [{}] {} | {} | {} | {} | {}",
                    e.id.map(|id| id.to_string()).unwrap_or_default(),
                    e.time_range(),
                    e.group,
                    e.subject,
                    e.room,
                    e.instructor
                );
            }
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());
            match &loaded {
                Ok(config) => {
                    log::info!("Config: {} ({} cohorts)", config_path.display(), config.cohorts.len());
                    show_store_info(config, &cli.storage_dir).await?;
                    let lock = cli.storage_dir.join(&config.sync.lock_file);
                    if lock.exists() {
                        log::info!("Run lock held: {}", lock.display());
                    }
                }
                Err(e) => log::info!("Config unavailable: {}", e),
            }
        }
    }

    log::info!("Done!");

    Ok(())
}

async fn show_store_info(config: &Config, storage_dir: &Path) -> Result<()> {
    match &config.store {
        StoreConfig::Local { file } => {
            let storage = LocalStorage::new(storage_dir.join(file));
            let document = storage.load().await?;
            log::info!(
                "Local store: {} ({} entries)",
                storage.path().display(),
                document.entries.len()
            );
            if let Some(latest) = document.entries.iter().map(|e| e.date_of_course).max() {
                log::info!("Latest stored course date: {}", latest);
            }
        }
        StoreConfig::Supabase { url, table, .. } => {
            let url = url::Url::parse(url)?;
            log::info!(
                "Supabase store: table {} on {}",
                table,
                url.host_str()
                    .ok_or_else(|| AppError::config("store url has no host"))?
            );
        }
    }
    Ok(())
}
