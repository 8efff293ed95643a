//! Storage abstractions for schedule persistence.
//!
//! Entries are logically keyed by their full identity tuple
//! (date, start, end, room, subject, instructor, group); the numeric id is
//! only a handle for deletions.
//!
//! - [`LocalStorage`]: JSON document in the storage directory
//! - [`SupabaseStore`]: PostgREST table

pub mod local;
pub mod supabase;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Config, ScheduleEntry, StoreConfig, StoreId};

// Re-export for convenience
pub use local::LocalStorage;
pub use supabase::{SupabaseLease, SupabaseStore};

/// Trait for schedule storage backends.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// All stored entries for one date.
    ///
    /// Fails with `AppError::StoreRead` on transport or auth failure.
    async fn read_by_date(&self, date: NaiveDate) -> Result<Vec<ScheduleEntry>>;

    /// Delete entries by id. Unknown ids are ignored.
    async fn delete_by_ids(&self, ids: &[StoreId]) -> Result<()>;

    /// Insert or replace an entry keyed by its identity fields.
    async fn upsert(&self, entry: &ScheduleEntry) -> Result<StoreId>;
}

/// Run-level lease held next to a store shared between hosts.
#[async_trait]
pub trait RunLease: Send + Sync {
    /// Take the lease for `owner` until released or `ttl` elapses.
    ///
    /// Fails with `AppError::RunInProgress` while another owner holds it.
    async fn acquire(&self, owner: &str, ttl: Duration) -> Result<()>;

    /// Release the lease if `owner` still holds it.
    async fn release(&self, owner: &str) -> Result<()>;
}

/// Build the store selected by configuration.
pub fn open_store(config: &Config, storage_dir: &Path) -> Result<Arc<dyn ScheduleStore>> {
    match &config.store {
        StoreConfig::Local { file } => Ok(Arc::new(LocalStorage::new(storage_dir.join(file)))),
        StoreConfig::Supabase { url, key, table } => Ok(Arc::new(SupabaseStore::new(
            url,
            key,
            table,
            &config.portal.user_agent,
            config.portal.timeout_secs,
        )?)),
    }
}

/// Build the run lease for stores reachable from several hosts.
///
/// The local store lives in the storage directory, where the run lock
/// file already covers it.
pub fn open_lease(config: &Config) -> Result<Option<Arc<dyn RunLease>>> {
    match &config.store {
        StoreConfig::Local { .. } => Ok(None),
        StoreConfig::Supabase { url, key, table } => Ok(Some(Arc::new(SupabaseLease::new(
            url,
            key,
            &config.sync.lock_table,
            table,
            &config.portal.user_agent,
            config.portal.timeout_secs,
        )?))),
    }
}
