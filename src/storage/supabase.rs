//! Supabase (PostgREST) storage implementation.
//!
//! Rows live in a single table whose columns match the serialized
//! [`ScheduleEntry`]. Upserts rely on a unique constraint over the seven
//! identity columns.
//!
//! [`SupabaseLease`] keeps the run lease in a second table
//! (`name` primary key, `owner`, `expires_at`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, SecondsFormat, TimeDelta, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ScheduleEntry, StoreId};
use crate::storage::{RunLease, ScheduleStore};
use crate::utils::http::create_async_client;

const IDENTITY_COLUMNS: &str = "dateOfCourse,startTime,endTime,salle,matiere,prof,classe";

/// Supabase storage backend.
pub struct SupabaseStore {
    client: Client,
    table_url: Url,
    headers: HeaderMap,
}

impl SupabaseStore {
    /// Create a store for `table` on the project at `url`.
    pub fn new(url: &str, key: &str, table: &str, user_agent: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: create_async_client(user_agent, timeout_secs)?,
            table_url: table_url(url, table)?,
            headers: auth_headers(key)?,
        })
    }

    fn request(&self, method: reqwest::Method, query: &[(&str, String)]) -> RequestBuilder {
        self.client
            .request(method, self.table_url.clone())
            .headers(self.headers.clone())
            .query(query)
    }
}

fn table_url(url: &str, table: &str) -> Result<Url> {
    Ok(Url::parse(url)?.join(&format!("rest/v1/{table}"))?)
}

fn auth_headers(key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert("apikey", header_value(key)?);
    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {key}"))?);
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AppError::config(format!("invalid store key: {e}")))
}

/// Send a request and fail on transport errors or non-success status.
async fn send(builder: RequestBuilder) -> std::result::Result<Response, String> {
    let response = builder.send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(format!("{status}: {body}"))
}

#[async_trait]
impl ScheduleStore for SupabaseStore {
    async fn read_by_date(&self, date: NaiveDate) -> Result<Vec<ScheduleEntry>> {
        let query = [
            ("select", "*".to_string()),
            ("dateOfCourse", format!("eq.{}", date.format("%Y-%m-%d"))),
        ];
        let response = send(self.request(reqwest::Method::GET, &query))
            .await
            .map_err(AppError::store_read)?;
        response
            .json::<Vec<ScheduleEntry>>()
            .await
            .map_err(AppError::store_read)
    }

    async fn delete_by_ids(&self, ids: &[StoreId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let list = ids
            .iter()
            .map(StoreId::to_string)
            .collect::<Vec<_>>()
            .join(",");
        send(self.request(reqwest::Method::DELETE, &[("id", format!("in.({list})"))]))
            .await
            .map_err(AppError::store_write)?;
        log::debug!("Deleted ids {}", list);
        Ok(())
    }

    async fn upsert(&self, entry: &ScheduleEntry) -> Result<StoreId> {
        let mut row = entry.clone();
        row.id = None;

        let response = send(
            self.request(
                reqwest::Method::POST,
                &[("on_conflict", IDENTITY_COLUMNS.to_string())],
            )
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[row]),
        )
        .await
        .map_err(AppError::store_write)?;

        let rows: Vec<ScheduleEntry> = response.json().await.map_err(AppError::store_write)?;
        rows.into_iter()
            .find_map(|r| r.id)
            .ok_or_else(|| AppError::store_write("upsert returned no row id"))
    }
}

/// Run lease stored as one row of a PostgREST lock table.
pub struct SupabaseLease {
    client: Client,
    table_url: Url,
    headers: HeaderMap,
    name: String,
}

#[derive(Serialize)]
struct LeaseRow<'a> {
    name: &'a str,
    owner: &'a str,
    expires_at: String,
}

impl SupabaseLease {
    /// Create a lease called `name` in `lock_table` on the project at `url`.
    pub fn new(
        url: &str,
        key: &str,
        lock_table: &str,
        name: &str,
        user_agent: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: create_async_client(user_agent, timeout_secs)?,
            table_url: table_url(url, lock_table)?,
            headers: auth_headers(key)?,
            name: name.to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, query: &[(&str, String)]) -> RequestBuilder {
        self.client
            .request(method, self.table_url.clone())
            .headers(self.headers.clone())
            .query(query)
    }
}

fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl RunLease for SupabaseLease {
    async fn acquire(&self, owner: &str, ttl: Duration) -> Result<()> {
        let now = Utc::now();
        let ttl = TimeDelta::from_std(ttl).map_err(|e| AppError::config(format!("lease ttl: {e}")))?;

        // Expired rows belong to runs that never released.
        send(self.request(
            reqwest::Method::DELETE,
            &[
                ("name", format!("eq.{}", self.name)),
                ("expires_at", format!("lt.{}", timestamp(now))),
            ],
        ))
        .await
        .map_err(AppError::store_write)?;

        let row = LeaseRow {
            name: &self.name,
            owner,
            expires_at: timestamp(now + ttl),
        };
        let response = self
            .request(reqwest::Method::POST, &[])
            .header("Prefer", "return=minimal")
            .json(&[row])
            .send()
            .await
            .map_err(AppError::store_write)?;

        match response.status() {
            status if status.is_success() => {
                log::debug!("Acquired run lease {}", self.name);
                Ok(())
            }
            StatusCode::CONFLICT => Err(AppError::RunInProgress(format!("lease {}", self.name))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::store_write(format!("{status}: {body}")))
            }
        }
    }

    async fn release(&self, owner: &str) -> Result<()> {
        send(self.request(
            reqwest::Method::DELETE,
            &[
                ("name", format!("eq.{}", self.name)),
                ("owner", format!("eq.{owner}")),
            ],
        ))
        .await
        .map_err(AppError::store_write)?;
        log::debug!("Released run lease {}", self.name);
        Ok(())
    }
}
