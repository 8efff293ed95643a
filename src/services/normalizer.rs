// src/services/normalizer.rs

//! Raw slot normalization.
//!
//! Turns positioned raw records into canonical [`ScheduleEntry`] values:
//! day association, instructor/group splitting, time formatting and the
//! "not specified" fallbacks.

use chrono::{Datelike, NaiveDate, NaiveTime};
use regex::Regex;

use crate::error::Result;
use crate::models::{
    CohortConfig, GROUP_UNSPECIFIED, INSTRUCTOR_UNSPECIFIED, ROOM_UNSPECIFIED,
    RawSlot, RawTimetable, SUBJECT_UNSPECIFIED, ScheduleEntry, TIME_UNSPECIFIED,
};
use crate::utils::french;

const TIME_SEPARATOR: &str = " - ";

/// Entries produced from one page, plus the slots that could not be placed.
#[derive(Debug, Default)]
pub struct Normalized {
    pub entries: Vec<ScheduleEntry>,
    /// Slots with no day header within the association threshold
    pub dropped: usize,
}

/// Converts raw slots into schedule entries for one cohort.
#[derive(Debug, Clone)]
pub struct SlotNormalizer {
    split_token: String,
    group_pattern: Regex,
    threshold: f64,
}

impl SlotNormalizer {
    /// Create a normalizer; `group_pattern` is anchored at the end of the text.
    pub fn new(split_token: impl Into<String>, group_pattern: &str, threshold: f64) -> Result<Self> {
        Ok(Self {
            split_token: split_token.into(),
            group_pattern: Regex::new(&format!("(?:{group_pattern})$"))?,
            threshold,
        })
    }

    /// Create a normalizer from a cohort's configuration.
    pub fn for_cohort(cohort: &CohortConfig, threshold: f64) -> Result<Self> {
        Self::new(cohort.split_token.clone(), &cohort.group_pattern, threshold)
    }

    /// Normalize every slot of a page.
    ///
    /// `reference` is the date the page was requested for; it anchors the
    /// year of day headers, which carry none.
    pub fn normalize_all(&self, timetable: &RawTimetable, reference: NaiveDate) -> Normalized {
        let days: Vec<(f64, NaiveDate)> = timetable
            .days
            .iter()
            .filter_map(|day| match resolve_day(&day.label, reference) {
                Some(date) => Some((day.offset, date)),
                None => {
                    log::warn!("Unreadable day header '{}'", day.label);
                    None
                }
            })
            .collect();

        let mut normalized = Normalized::default();
        for slot in &timetable.slots {
            match self.associate(&days, slot.offset) {
                Some(date) => normalized.entries.push(self.normalize(slot, date)),
                None => {
                    normalized.dropped += 1;
                    log::warn!(
                        "Dropping slot '{}' at offset {:.2}%: no day header within {:.2}%",
                        slot.subject,
                        slot.offset,
                        self.threshold
                    );
                }
            }
        }
        normalized
    }

    /// Date of the header nearest to `offset`, if strictly closer than the threshold.
    ///
    /// On equal distance the first header wins.
    pub fn associate(&self, days: &[(f64, NaiveDate)], offset: f64) -> Option<NaiveDate> {
        let mut best: Option<(f64, NaiveDate)> = None;
        for &(day_offset, date) in days {
            let distance = (day_offset - offset).abs();
            let limit = best.map_or(self.threshold, |(d, _)| d);
            if distance < limit {
                best = Some((distance, date));
            }
        }
        best.map(|(_, date)| date)
    }

    /// Build the canonical entry for a slot placed on `date`.
    pub fn normalize(&self, raw: &RawSlot, date: NaiveDate) -> ScheduleEntry {
        let (start_time, end_time) = split_time_range(&raw.time_range);
        let combined = raw.instructor_group.trim();

        ScheduleEntry {
            id: None,
            date_of_course: date,
            start_time,
            end_time,
            room: or_sentinel(&raw.room, ROOM_UNSPECIFIED),
            subject: or_sentinel(&raw.subject, SUBJECT_UNSPECIFIED),
            instructor: self.instructor(combined),
            group: self.group(combined),
        }
    }

    fn instructor(&self, combined: &str) -> String {
        let before = combined
            .split(self.split_token.as_str())
            .next()
            .unwrap_or_default();
        or_sentinel(before, INSTRUCTOR_UNSPECIFIED)
    }

    fn group(&self, combined: &str) -> String {
        self.group_pattern
            .find(combined)
            .map(|m| m.as_str().trim())
            .filter(|g| !g.is_empty())
            .map_or_else(|| GROUP_UNSPECIFIED.to_string(), str::to_string)
    }
}

/// Resolve a day header such as `Mardi 12 Mars` to a date.
///
/// The header has no year: the candidate in the reference year, the year
/// before or the year after that lies closest to `reference` is chosen, so a
/// December run fetching January pages lands in the following year.
pub fn resolve_day(label: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let mut words = label.split_whitespace();
    words.next()?; // weekday name
    let day: u32 = words.next()?.parse().ok()?;
    let month = french::parse_month(words.next()?)?;

    let year = reference.year();
    [year - 1, year, year + 1]
        .into_iter()
        .filter_map(|y| NaiveDate::from_ymd_opt(y, month, day))
        .min_by_key(|candidate| (*candidate - reference).num_days().abs())
}

/// Split `08:00 - 10:00` into normalized `HH:MM` strings.
fn split_time_range(text: &str) -> (String, String) {
    let text = text.trim();
    if text.is_empty() {
        return (TIME_UNSPECIFIED.to_string(), TIME_UNSPECIFIED.to_string());
    }
    let mut parts = text.splitn(2, TIME_SEPARATOR).map(str::trim);
    let start = parts.next().map(format_time);
    let end = parts.next().map(format_time);
    (
        start.unwrap_or_else(|| TIME_UNSPECIFIED.to_string()),
        end.unwrap_or_else(|| TIME_UNSPECIFIED.to_string()),
    )
}

/// Format a time as `HH:MM` when it parses, otherwise keep the text.
fn format_time(text: &str) -> String {
    if text.is_empty() {
        return TIME_UNSPECIFIED.to_string();
    }
    ["%H:%M", "%Hh%M", "%HH%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
        .map_or_else(|| text.to_string(), |t| t.format("%H:%M").to_string())
}

fn or_sentinel(text: &str, sentinel: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        sentinel.to_string()
    } else {
        text.to_string()
    }
}
