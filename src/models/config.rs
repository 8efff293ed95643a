//! Application configuration structures.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::Weekday;
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Timetable portal access
    #[serde(default)]
    pub portal: PortalConfig,

    /// Look-ahead window and day association settings
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Where schedule entries are persisted
    #[serde(default)]
    pub store: StoreConfig,

    /// Notification rendering
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Run coordination
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Tracked cohorts, processed in order
    #[serde(default)]
    pub cohorts: Vec<CohortConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Look up a cohort by name.
    pub fn cohort(&self, name: &str) -> Option<&CohortConfig> {
        self.cohorts.iter().find(|c| c.name == name)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.portal.user_agent.trim().is_empty() {
            return Err(AppError::validation("portal.user_agent is empty"));
        }
        if self.portal.timeout_secs == 0 {
            return Err(AppError::validation("portal.timeout_secs must be > 0"));
        }
        url::Url::parse(&self.portal.base_url)?;

        if self.schedule.occurrences == 0 {
            return Err(AppError::validation("schedule.occurrences must be > 0"));
        }
        if self.schedule.horizon_months == 0 {
            return Err(AppError::validation("schedule.horizon_months must be > 0"));
        }
        let threshold = self.schedule.association_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(AppError::validation(
                "schedule.association_threshold must be a positive number",
            ));
        }
        self.schedule.tz()?;

        if let StoreConfig::Supabase { url, key, table } = &self.store {
            url::Url::parse(url)?;
            if key.trim().is_empty() {
                return Err(AppError::validation("store.key is empty"));
            }
            if table.trim().is_empty() {
                return Err(AppError::validation("store.table is empty"));
            }
        }

        if self.cohorts.is_empty() {
            return Err(AppError::validation("No cohorts defined"));
        }
        let mut names = HashSet::new();
        for cohort in &self.cohorts {
            cohort.validate()?;
            if !names.insert(cohort.name.as_str()) {
                return Err(AppError::validation(format!(
                    "Duplicate cohort name: {}",
                    cohort.name
                )));
            }
        }
        Ok(())
    }
}

/// Timetable portal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Timetable endpoint, also used for the login form
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Cookie forcing the French rendering of the timetable
    #[serde(default = "defaults::locale_cookie")]
    pub locale_cookie: String,

    /// Name of the session ticket cookie issued after login
    #[serde(default = "defaults::ticket_cookie")]
    pub ticket_cookie: String,

    /// `execution` field expected by the login form
    #[serde(default)]
    pub execution_token: String,

    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Redirects followed during login
    #[serde(default = "defaults::max_redirects")]
    pub max_redirects: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            locale_cookie: defaults::locale_cookie(),
            ticket_cookie: defaults::ticket_cookie(),
            execution_token: String::new(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_redirects: defaults::max_redirects(),
        }
    }
}

/// Look-ahead and notification window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Weekday whose week pages are fetched
    #[serde(default = "defaults::target_weekday")]
    pub target_weekday: Weekday,

    /// Length of the look-ahead window
    #[serde(default = "defaults::horizon_months")]
    pub horizon_months: u32,

    /// Maximum number of target dates per run
    #[serde(default = "defaults::occurrences")]
    pub occurrences: usize,

    /// Weekday that opens the notification window
    #[serde(default = "defaults::notification_weekday")]
    pub notification_weekday: Weekday,

    /// Maximum offset distance (percent) between a slot and its day header
    #[serde(default = "defaults::association_threshold")]
    pub association_threshold: f64,

    /// IANA timezone used to determine "today"
    #[serde(default = "defaults::timezone")]
    pub timezone: String,
}

impl ScheduleConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            AppError::config(format!("Invalid timezone '{}': {}", self.timezone, e))
        })
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            target_weekday: defaults::target_weekday(),
            horizon_months: defaults::horizon_months(),
            occurrences: defaults::occurrences(),
            notification_weekday: defaults::notification_weekday(),
            association_threshold: defaults::association_threshold(),
            timezone: defaults::timezone(),
        }
    }
}

/// Schedule store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// JSON document inside the storage directory
    Local {
        #[serde(default = "defaults::store_file")]
        file: String,
    },
    /// PostgREST table hosted by Supabase
    Supabase {
        url: String,
        key: String,
        #[serde(default = "defaults::table")]
        table: String,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Local {
            file: defaults::store_file(),
        }
    }
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Embed colour tag
    #[serde(default = "defaults::color")]
    pub color: u32,

    /// Delivery timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            color: defaults::color(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Run coordination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Lock file name, relative to the storage directory
    #[serde(default = "defaults::lock_file")]
    pub lock_file: String,

    /// Age after which an existing lock is considered abandoned
    #[serde(default = "defaults::stale_lock")]
    pub stale_lock_secs: u64,

    /// Lease table used when the store is shared (Supabase)
    #[serde(default = "defaults::lock_table")]
    pub lock_table: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock_file: defaults::lock_file(),
            stale_lock_secs: defaults::stale_lock(),
            lock_table: defaults::lock_table(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// One tracked cohort.
#[derive(Clone, Serialize, Deserialize)]
pub struct CohortConfig {
    /// Display name, used in logs and reports
    pub name: String,

    pub username: String,

    pub password: String,

    /// Text separating the instructor from the group information
    pub split_token: String,

    /// Regular expression matched at the end of the instructor/group text
    pub group_pattern: String,

    /// Webhook receiving this cohort's notifications
    pub webhook: String,
}

impl CohortConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("cohort name is empty"));
        }
        if self.split_token.is_empty() {
            return Err(AppError::validation(format!(
                "cohort {}: split_token is empty",
                self.name
            )));
        }
        Regex::new(&self.group_pattern)?;
        url::Url::parse(&self.webhook).map_err(|e| {
            AppError::validation(format!("cohort {}: invalid webhook: {}", self.name, e))
        })?;
        Ok(())
    }
}

impl fmt::Debug for CohortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CohortConfig")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("split_token", &self.split_token)
            .field("group_pattern", &self.group_pattern)
            .field("webhook", &"<redacted>")
            .finish()
    }
}

mod defaults {
    use chrono::Weekday;

    // Portal defaults
    pub fn base_url() -> String {
        "https://ws-edt-cd.wigorservices.net/WebPsDyn.aspx".into()
    }
    pub fn locale_cookie() -> String {
        "org.springframework.web.servlet.i18n.CookieLocaleResolver.LOCALE=fr-FR".into()
    }
    pub fn ticket_cookie() -> String {
        ".DotNetCasClientAuth".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; timetable-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_redirects() -> usize {
        200
    }

    // Schedule defaults
    pub fn target_weekday() -> Weekday {
        Weekday::Tue
    }
    pub fn horizon_months() -> u32 {
        1
    }
    pub fn occurrences() -> usize {
        5
    }
    pub fn notification_weekday() -> Weekday {
        Weekday::Thu
    }
    pub fn association_threshold() -> f64 {
        2.0
    }
    pub fn timezone() -> String {
        "Europe/Paris".into()
    }

    // Store defaults
    pub fn store_file() -> String {
        "schedule.json".into()
    }
    pub fn table() -> String {
        "EDT".into()
    }

    // Notify defaults
    pub fn color() -> u32 {
        5814783
    }

    // Sync defaults
    pub fn lock_file() -> String {
        "sync.lock".into()
    }
    pub fn stale_lock() -> u64 {
        2 * 60 * 60
    }
    pub fn lock_table() -> String {
        "sync_locks".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort(name: &str) -> CohortConfig {
        CohortConfig {
            name: name.to_string(),
            username: "user".to_string(),
            password: "secret".to_string(),
            split_token: "BACHELOR".to_string(),
            group_pattern: "BACHELOR.*".to_string(),
            webhook: "https://discord.com/api/webhooks/1/abc".to_string(),
        }
    }

    fn valid_config() -> Config {
        Config {
            cohorts: vec![cohort("CDA")],
            ..Config::default()
        }
    }

    #[test]
    fn validate_config_with_cohort_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_cohorts() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = valid_config();
        config.portal.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_group_pattern() {
        let mut config = valid_config();
        config.cohorts[0].group_pattern = "BACHELOR(".to_string();
        assert!(matches!(config.validate(), Err(AppError::Pattern(_))));
    }

    #[test]
    fn validate_rejects_duplicate_cohorts() {
        let mut config = valid_config();
        config.cohorts.push(cohort("CDA"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_timezone() {
        let mut config = valid_config();
        config.schedule.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
            [schedule]
            target_weekday = "Wed"
            notification_weekday = "Mon"
            occurrences = 3

            [store]
            backend = "supabase"
            url = "https://project.supabase.co"
            key = "anon"

            [[cohorts]]
            name = "WIS"
            username = "wis"
            password = "pw"
            split_token = "Cours"
            group_pattern = "Cours.*"
            webhook = "https://discord.com/api/webhooks/2/def"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.schedule.target_weekday, Weekday::Wed);
        assert_eq!(config.schedule.notification_weekday, Weekday::Mon);
        assert_eq!(config.schedule.occurrences, 3);
        assert_eq!(config.schedule.horizon_months, 1);
        match &config.store {
            StoreConfig::Supabase { table, .. } => assert_eq!(table, "EDT"),
            other => panic!("unexpected store {other:?}"),
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", cohort("CDA"));
        assert!(!rendered.contains("secret"));
    }
}
