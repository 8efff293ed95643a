//! Raw records as extracted from the timetable markup.

use serde::{Deserialize, Serialize};

/// A day column header positioned along the horizontal axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayHeader {
    /// Horizontal position in percent
    pub offset: f64,

    /// Header text, e.g. `Mardi 12 Mars`
    pub label: String,
}

/// A course slot positioned along the horizontal axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSlot {
    /// Horizontal position in percent
    pub offset: f64,

    /// Time range text, e.g. `08:00 - 10:00`
    pub time_range: String,

    pub room: String,

    pub subject: String,

    /// Instructor name followed by group information
    pub instructor_group: String,
}

/// Everything extracted from one fetched week page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTimetable {
    pub days: Vec<DayHeader>,
    pub slots: Vec<RawSlot>,
}

impl RawTimetable {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
