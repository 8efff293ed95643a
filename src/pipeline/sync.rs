// src/pipeline/sync.rs

//! Schedule synchronization: fetch, normalize, reconcile and apply.
//!
//! Cohorts and target dates are processed one at a time. Failures are
//! isolated: an authentication failure skips the cohort, a fetch failure
//! skips the date, a store read failure skips the course date and a store
//! write failure skips the slot.
//!
//! The stored entries of a course date are read once per page, so slots of
//! the same page never evict each other. A replacement is announced only
//! once the new entry is stored.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{CohortConfig, Config, ScheduleEntry};
use crate::notify::{DeliveryReport, DiscordWebhook, NotificationDispatcher, NotificationSink};
use crate::services::{PortalSession, SlotNormalizer, TimetableSource, WigorPortal};
use crate::storage::{RunLease, ScheduleStore, open_lease, open_store};

use super::lock::RunLock;
use super::reconcile::{DateSnapshot, Plan, ReconciliationEngine};
use super::window::{NotificationWindow, target_dates, today_in};

/// Run one synchronization with the production collaborators.
///
/// Holds the run lock in `storage_dir` for the whole run, plus the store's
/// run lease when the store is shared between hosts. "Today" is taken in
/// the configured timezone.
pub async fn run_sync(
    config: &Config,
    storage_dir: &Path,
    cohort: Option<&str>,
) -> Result<SyncReport> {
    let stale_after = Duration::from_secs(config.sync.stale_lock_secs);
    let lock = RunLock::acquire(storage_dir.join(&config.sync.lock_file), stale_after)?;
    let lease = open_lease(config)?;

    let report = with_lease(lease.as_deref(), lock.owner(), stale_after, async {
        let today = today_in(config.schedule.tz()?);
        let sync = ScheduleSync::new(
            Arc::new(WigorPortal::new(&config.portal)?),
            open_store(config, storage_dir)?,
            Arc::new(DiscordWebhook::new(
                &config.portal.user_agent,
                config.notify.timeout_secs,
            )?),
            config.clone(),
        );
        sync.run(today, cohort).await
    })
    .await?;

    log::info!(
        "Sync finished in {:.1}s: {} inserted, {} replaced, {} unchanged",
        lock.elapsed().as_secs_f64(),
        report.inserted(),
        report.replaced(),
        report.unchanged()
    );
    Ok(report)
}

/// Run `work` while holding `lease`, releasing it whatever the outcome.
async fn with_lease<T>(
    lease: Option<&dyn RunLease>,
    owner: &str,
    ttl: Duration,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    let Some(lease) = lease else {
        return work.await;
    };

    lease.acquire(owner, ttl).await?;
    let result = work.await;
    if let Err(e) = lease.release(owner).await {
        log::warn!("Failed to release run lease: {}", e);
    }
    result
}

/// Counters for one cohort.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CohortReport {
    pub cohort: String,
    pub authenticated: bool,
    /// Reason the cohort was abandoned, if it was
    pub error: Option<String>,
    pub dates_attempted: usize,
    pub dates_failed: usize,
    /// Raw slots found on the fetched pages
    pub slots_seen: usize,
    /// Slots without a day header within the association threshold
    pub slots_dropped: usize,
    pub unchanged: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub read_failures: usize,
    pub write_failures: usize,
    pub notifications: DeliveryReport,
}

impl CohortReport {
    fn new(cohort: &str) -> Self {
        Self {
            cohort: cohort.to_string(),
            ..Self::default()
        }
    }

    /// True when every unit of work for this cohort succeeded.
    pub fn is_clean(&self) -> bool {
        self.authenticated
            && self.error.is_none()
            && self.dates_failed == 0
            && self.read_failures == 0
            && self.write_failures == 0
            && self.notifications.failed.is_empty()
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub today: NaiveDate,
    pub target_dates: Vec<NaiveDate>,
    pub window: NotificationWindow,
    pub cohorts: Vec<CohortReport>,
}

impl SyncReport {
    pub fn inserted(&self) -> usize {
        self.cohorts.iter().map(|c| c.inserted).sum()
    }

    pub fn replaced(&self) -> usize {
        self.cohorts.iter().map(|c| c.replaced).sum()
    }

    pub fn unchanged(&self) -> usize {
        self.cohorts.iter().map(|c| c.unchanged).sum()
    }

    pub fn notifications_delivered(&self) -> usize {
        self.cohorts.iter().map(|c| c.notifications.delivered).sum()
    }

    pub fn notifications_failed(&self) -> usize {
        self.cohorts.iter().map(|c| c.notifications.failed.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.cohorts.iter().all(CohortReport::is_clean)
    }
}

/// Drives one synchronization run over the configured cohorts.
pub struct ScheduleSync {
    source: Arc<dyn TimetableSource>,
    store: Arc<dyn ScheduleStore>,
    sink: Arc<dyn NotificationSink>,
    config: Config,
}

impl ScheduleSync {
    pub fn new(
        source: Arc<dyn TimetableSource>,
        store: Arc<dyn ScheduleStore>,
        sink: Arc<dyn NotificationSink>,
        config: Config,
    ) -> Self {
        Self {
            source,
            store,
            sink,
            config,
        }
    }

    /// Run a synchronization for `today`, optionally restricted to one cohort.
    pub async fn run(&self, today: NaiveDate, cohort_filter: Option<&str>) -> Result<SyncReport> {
        let cohorts: Vec<&CohortConfig> = match cohort_filter {
            Some(name) => vec![self.config.cohort(name).ok_or_else(|| {
                AppError::validation(format!("Unknown cohort: {name}"))
            })?],
            None => self.config.cohorts.iter().collect(),
        };

        let schedule = &self.config.schedule;
        let dates = target_dates(
            today,
            schedule.target_weekday,
            schedule.horizon_months,
            schedule.occurrences,
        );
        let window = NotificationWindow::current(today, schedule.notification_weekday);
        let engine = ReconciliationEngine::new(window);

        log::info!(
            "Syncing {} cohort(s) over {} date(s); announcing {} to {}",
            cohorts.len(),
            dates.len(),
            window.start,
            window.end
        );

        let mut reports = Vec::with_capacity(cohorts.len());
        for cohort in cohorts {
            let report = self.sync_cohort(cohort, &dates, &engine).await;
            log::info!(
                "Cohort {}: {} inserted, {} replaced, {} unchanged, {} dropped, {} notified",
                report.cohort,
                report.inserted,
                report.replaced,
                report.unchanged,
                report.slots_dropped,
                report.notifications.delivered
            );
            reports.push(report);
        }

        Ok(SyncReport {
            today,
            target_dates: dates,
            window,
            cohorts: reports,
        })
    }

    async fn sync_cohort(
        &self,
        cohort: &CohortConfig,
        dates: &[NaiveDate],
        engine: &ReconciliationEngine,
    ) -> CohortReport {
        let mut report = CohortReport::new(&cohort.name);

        let normalizer =
            match SlotNormalizer::for_cohort(cohort, self.config.schedule.association_threshold) {
                Ok(n) => n,
                Err(e) => {
                    log::error!("Cohort {} skipped: {}", cohort.name, e);
                    report.error = Some(e.to_string());
                    return report;
                }
            };

        let session = match self.source.open_session(cohort).await {
            Ok(session) => session,
            Err(e) => {
                log::error!("{}", e);
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.authenticated = true;

        let mut dispatcher = NotificationDispatcher::new(Arc::clone(&self.sink));
        for &date in dates {
            self.sync_date(
                cohort,
                &session,
                &normalizer,
                engine,
                date,
                &mut dispatcher,
                &mut report,
            )
            .await;
        }

        report.notifications = dispatcher.drain().await;
        report
    }

    #[allow(clippy::too_many_arguments)]
    async fn sync_date(
        &self,
        cohort: &CohortConfig,
        session: &PortalSession,
        normalizer: &SlotNormalizer,
        engine: &ReconciliationEngine,
        date: NaiveDate,
        dispatcher: &mut NotificationDispatcher,
        report: &mut CohortReport,
    ) {
        report.dates_attempted += 1;

        let timetable = match self.source.fetch_week(session, date).await {
            Ok(timetable) => timetable,
            Err(e) => {
                log::error!("{}", e);
                report.dates_failed += 1;
                return;
            }
        };
        if timetable.is_empty() {
            log::info!("{}: empty timetable for week of {}", cohort.name, date);
        }

        let normalized = normalizer.normalize_all(&timetable, date);
        report.slots_seen += timetable.slots.len();
        report.slots_dropped += normalized.dropped;

        // Each course date is reconciled against one read of the store.
        let mut course_dates: Vec<NaiveDate> = Vec::new();
        for entry in &normalized.entries {
            if !course_dates.contains(&entry.date_of_course) {
                course_dates.push(entry.date_of_course);
            }
        }

        for course_date in course_dates {
            let observed: Vec<&ScheduleEntry> = normalized
                .entries
                .iter()
                .filter(|e| e.date_of_course == course_date)
                .collect();

            let stored = match self.store.read_by_date(course_date).await {
                Ok(stored) => stored,
                Err(e) => {
                    log::error!(
                        "{}: reconciliation for {} abandoned ({} slot(s)): {}",
                        cohort.name,
                        course_date,
                        observed.len(),
                        e
                    );
                    report.read_failures += 1;
                    continue;
                }
            };

            let mut snapshot = DateSnapshot::new(stored, observed.iter().copied());
            for entry in observed {
                let plan = engine.plan(entry, &snapshot.reconcile(entry));
                self.apply(cohort, entry, plan, &mut snapshot, dispatcher, report)
                    .await;
            }
        }
    }

    async fn apply(
        &self,
        cohort: &CohortConfig,
        entry: &ScheduleEntry,
        plan: Plan,
        snapshot: &mut DateSnapshot,
        dispatcher: &mut NotificationDispatcher,
        report: &mut CohortReport,
    ) {
        let color = self.config.notify.color;
        match plan {
            Plan::Unchanged => report.unchanged += 1,
            Plan::Replace { ids, event } => {
                if let Err(e) = self.store.delete_by_ids(&ids).await {
                    log::error!("{}: replacement of {:?} abandoned: {}", cohort.name, ids, e);
                    report.write_failures += 1;
                    return;
                }
                snapshot.record_deleted(&ids);
                match self.store.upsert(entry).await {
                    Ok(id) => {
                        snapshot.record_written(entry, id);
                        dispatcher.dispatch(&cohort.webhook, event.to_message(color));
                        log::info!(
                            "{}: {} {} replaced {:?} as {}",
                            cohort.name,
                            entry.date_of_course,
                            entry.time_range(),
                            ids,
                            id
                        );
                        report.replaced += 1;
                    }
                    Err(e) => {
                        log::error!(
                            "{}: upsert failed after deleting {:?}, change not announced: {}",
                            cohort.name,
                            ids,
                            e
                        );
                        report.write_failures += 1;
                    }
                }
            }
            Plan::Insert { event } => match self.store.upsert(entry).await {
                Ok(id) => {
                    snapshot.record_written(entry, id);
                    log::debug!(
                        "{}: stored {} {} as {}",
                        cohort.name,
                        entry.date_of_course,
                        entry.time_range(),
                        id
                    );
                    report.inserted += 1;
                    if let Some(event) = event {
                        dispatcher.dispatch(&cohort.webhook, event.to_message(color));
                    }
                }
                Err(e) => {
                    log::error!("{}: upsert failed: {}", cohort.name, e);
                    report.write_failures += 1;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLease {
        held_by: Mutex<Option<String>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RunLease for RecordingLease {
        async fn acquire(&self, owner: &str, _ttl: Duration) -> Result<()> {
            self.calls.lock().unwrap().push(format!("acquire {owner}"));
            let mut held = self.held_by.lock().unwrap();
            if held.is_some() {
                return Err(AppError::RunInProgress("lease EDT".into()));
            }
            *held = Some(owner.to_string());
            Ok(())
        }

        async fn release(&self, owner: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("release {owner}"));
            let mut held = self.held_by.lock().unwrap();
            if held.as_deref() == Some(owner) {
                *held = None;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lease_is_released_after_failed_run() {
        let lease = RecordingLease::default();
        let result: Result<()> = with_lease(Some(&lease), "me", Duration::from_secs(60), async {
            Err(AppError::validation("boom"))
        })
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(*lease.calls.lock().unwrap(), vec!["acquire me", "release me"]);
        assert!(lease.held_by.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_held_lease_skips_the_run() {
        let lease = RecordingLease::default();
        *lease.held_by.lock().unwrap() = Some("other host".into());

        let mut ran = false;
        let result = with_lease(Some(&lease), "me", Duration::from_secs(60), async {
            ran = true;
            Ok::<_, AppError>(())
        })
        .await;

        assert!(matches!(result, Err(AppError::RunInProgress(_))));
        assert!(!ran);
        assert_eq!(lease.held_by.lock().unwrap().as_deref(), Some("other host"));
    }

    #[tokio::test]
    async fn test_without_lease_runs_directly() {
        let work = async { Ok::<_, AppError>(7) };
        let value = with_lease(None, "me", Duration::from_secs(60), work)
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
