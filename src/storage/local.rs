//! Local filesystem storage implementation.
//!
//! Keeps every entry in a single JSON document, rewritten atomically after
//! each mutation. Suited to development and single-host deployments.
//!
//! ## Document Layout
//!
//! ```text
//! {
//!   "next_id": 4,
//!   "entries": [ { "id": 1, "dateOfCourse": "2024-03-12", ... } ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ScheduleEntry, StoreId};
use crate::storage::ScheduleStore;

/// Persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleDocument {
    /// Next id to hand out
    #[serde(default = "first_id")]
    pub next_id: i64,

    #[serde(default)]
    pub entries: Vec<ScheduleEntry>,
}

fn first_id() -> i64 {
    1
}

/// Local filesystem storage backend.
pub struct LocalStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process.
    guard: Mutex<()>,
}

impl LocalStorage {
    /// Create a LocalStorage backed by the given JSON file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole document, empty if the file does not exist yet.
    pub async fn load(&self) -> Result<ScheduleDocument> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ScheduleDocument {
                next_id: first_id(),
                entries: Vec::new(),
            }),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Write the document atomically (write to temp, then rename).
    async fn save(&self, document: &ScheduleDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for LocalStorage {
    async fn read_by_date(&self, date: NaiveDate) -> Result<Vec<ScheduleEntry>> {
        let _guard = self.guard.lock().await;
        let document = self.load().await.map_err(AppError::store_read)?;
        Ok(document
            .entries
            .into_iter()
            .filter(|e| e.date_of_course == date)
            .collect())
    }

    async fn delete_by_ids(&self, ids: &[StoreId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _guard = self.guard.lock().await;
        let mut document = self.load().await.map_err(AppError::store_write)?;

        let doomed: HashSet<StoreId> = ids.iter().copied().collect();
        let before = document.entries.len();
        document
            .entries
            .retain(|e| e.id.is_none_or(|id| !doomed.contains(&id)));
        log::debug!(
            "Deleted {} entries from {}",
            before - document.entries.len(),
            self.path.display()
        );

        self.save(&document).await.map_err(AppError::store_write)
    }

    async fn upsert(&self, entry: &ScheduleEntry) -> Result<StoreId> {
        let _guard = self.guard.lock().await;
        let mut document = self.load().await.map_err(AppError::store_write)?;

        if let Some(id) = document
            .entries
            .iter()
            .find(|stored| stored.same_occurrence(entry))
            .and_then(|stored| stored.id)
        {
            log::debug!("Entry {} already stored as {}", entry.fingerprint(), id);
            return Ok(id);
        }

        let id = StoreId(document.next_id);
        document.next_id += 1;
        document.entries.push(entry.clone().with_id(id));
        self.save(&document).await.map_err(AppError::store_write)?;
        Ok(id)
    }
}
