//! Canonical schedule entry and its identity rules.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Placeholder used when a slot has no readable time range.
pub const TIME_UNSPECIFIED: &str = "Horaire non spécifié";
/// Placeholder used when a slot has no room.
pub const ROOM_UNSPECIFIED: &str = "Salle non spécifiée";
/// Placeholder used when a slot has no subject.
pub const SUBJECT_UNSPECIFIED: &str = "Matière non spécifiée";
/// Placeholder used when no instructor can be extracted.
pub const INSTRUCTOR_UNSPECIFIED: &str = "Prof non spécifié";
/// Placeholder used when the group pattern does not match.
pub const GROUP_UNSPECIFIED: &str = "Info supplémentaire non spécifiée";

/// Identifier assigned by a schedule store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub i64);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One course occurrence on the timetable.
///
/// Field names on the wire follow the persisted table layout
/// (`dateOfCourse`, `startTime`, `endTime`, `salle`, `matiere`, `prof`, `classe`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Store-assigned id, absent until persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<StoreId>,

    #[serde(rename = "dateOfCourse")]
    pub date_of_course: NaiveDate,

    /// `HH:MM` when the source was readable
    #[serde(rename = "startTime")]
    pub start_time: String,

    #[serde(rename = "endTime")]
    pub end_time: String,

    #[serde(rename = "salle")]
    pub room: String,

    #[serde(rename = "matiere")]
    pub subject: String,

    #[serde(rename = "prof")]
    pub instructor: String,

    #[serde(rename = "classe")]
    pub group: String,
}

impl ScheduleEntry {
    /// True when both entries describe the same occurrence.
    ///
    /// All seven identity fields must match; the store id is ignored.
    pub fn same_occurrence(&self, other: &ScheduleEntry) -> bool {
        self.date_of_course == other.date_of_course
            && self.start_time == other.start_time
            && self.end_time == other.end_time
            && self.room == other.room
            && self.subject == other.subject
            && self.instructor == other.instructor
            && self.group == other.group
    }

    /// True when both entries claim overlapping time for the same group on the same day.
    ///
    /// Room, subject and instructor are not considered. Entries whose times
    /// cannot be read never conflict.
    pub fn conflicts_with(&self, other: &ScheduleEntry) -> bool {
        if self.group != other.group || self.date_of_course != other.date_of_course {
            return false;
        }
        match (self.interval(), other.interval()) {
            (Some(a), Some(b)) => intervals_overlap(a, b),
            _ => false,
        }
    }

    /// Parsed `(start, end)` times, if both are valid `HH:MM` values.
    pub fn interval(&self) -> Option<(NaiveTime, NaiveTime)> {
        let start = NaiveTime::parse_from_str(&self.start_time, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(&self.end_time, "%H:%M").ok()?;
        Some((start, end))
    }

    /// Human-readable time range, e.g. `08:00 à 10:00`.
    pub fn time_range(&self) -> String {
        format!("{} à {}", self.start_time, self.end_time)
    }

    /// Stable hex digest of the identity fields.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let date = self.date_of_course.format("%Y-%m-%d").to_string();
        for part in [
            date.as_str(),
            self.start_time.as_str(),
            self.end_time.as_str(),
            self.room.as_str(),
            self.subject.as_str(),
            self.instructor.as_str(),
            self.group.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(hasher.finalize())
    }

    /// Copy of this entry carrying the given store id.
    pub fn with_id(mut self, id: StoreId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Interval overlap covering partial overlap at either end and containment.
pub fn intervals_overlap(
    (start, end): (NaiveTime, NaiveTime),
    (existing_start, existing_end): (NaiveTime, NaiveTime),
) -> bool {
    (start >= existing_start && start < existing_end)
        || (end > existing_start && end <= existing_end)
        || (start <= existing_start && end >= existing_end)
}
