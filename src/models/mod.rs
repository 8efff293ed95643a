// src/models/mod.rs

//! Domain models for the timetable crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod entry;
mod event;
mod raw;

// Re-export all public types
pub use config::{
    CohortConfig, Config, LoggingConfig, NotifyConfig, PortalConfig, ScheduleConfig,
    StoreConfig, SyncConfig,
};
pub use entry::{
    GROUP_UNSPECIFIED, INSTRUCTOR_UNSPECIFIED, ROOM_UNSPECIFIED, SUBJECT_UNSPECIFIED,
    ScheduleEntry, StoreId, TIME_UNSPECIFIED, intervals_overlap,
};
pub use event::{ChangeEvent, DESCRIPTION_LIMIT, NotificationMessage, TITLE_LIMIT};
pub use raw::{DayHeader, RawSlot, RawTimetable};
