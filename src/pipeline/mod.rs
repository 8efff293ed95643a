//! Synchronization pipeline.
//!
//! - `window`: target dates and the notification window
//! - `reconcile`: per-entry change detection
//! - `sync`: the run over cohorts and dates
//! - `lock`: run-level mutual exclusion

pub mod lock;
pub mod reconcile;
pub mod sync;
pub mod window;

pub use lock::RunLock;
pub use reconcile::{DateSnapshot, Plan, Reconciliation, ReconciliationEngine, reconcile};
pub use sync::{CohortReport, ScheduleSync, SyncReport, run_sync};
pub use window::{NotificationWindow, target_dates, today_in};
