// src/services/timetable.rs

//! Timetable markup extraction.
//!
//! The portal renders a week as absolutely positioned boxes: `.Jour` day
//! headers and `.Case` course slots, each carrying a `left: X%` inline style.
//! This module only turns markup into raw records; pairing slots with days is
//! done by the normalizer.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{DayHeader, RawSlot, RawTimetable};

const LEFT_OFFSET: &str = r"(?i)(?:^|;)\s*left\s*:\s*(-?[0-9]+(?:\.[0-9]+)?)\s*%";

/// CSS selectors describing the timetable layout.
struct TimetableSelectors {
    day: Selector,
    day_label: Selector,
    slot: Selector,
    time_range: Selector,
    room: Selector,
    subject: Selector,
    instructor_group: Selector,
    left: Regex,
}

impl TimetableSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            day: parse_selector(".Jour")?,
            day_label: parse_selector(".TCJour")?,
            slot: parse_selector(".Case")?,
            time_range: parse_selector(".TChdeb")?,
            room: parse_selector(".TCSalle")?,
            subject: parse_selector("td.TCase")?,
            instructor_group: parse_selector(".TCProf")?,
            left: Regex::new(LEFT_OFFSET)?,
        })
    }
}

/// Extract day headers and course slots from a week page.
pub fn parse_timetable(html: &str) -> Result<RawTimetable> {
    let selectors = TimetableSelectors::new()?;
    let document = Html::parse_document(html);
    let mut timetable = RawTimetable::default();

    for day in document.select(&selectors.day) {
        let Some(offset) = left_offset(&day, &selectors.left) else {
            log::debug!("Skipping day header without left offset");
            continue;
        };
        timetable.days.push(DayHeader {
            offset,
            label: child_text(&day, &selectors.day_label),
        });
    }

    for slot in document.select(&selectors.slot) {
        let Some(offset) = left_offset(&slot, &selectors.left) else {
            log::debug!("Skipping slot without left offset");
            continue;
        };
        timetable.slots.push(RawSlot {
            offset,
            time_range: child_text(&slot, &selectors.time_range),
            room: child_text(&slot, &selectors.room),
            subject: child_text(&slot, &selectors.subject),
            instructor_group: child_text(&slot, &selectors.instructor_group),
        });
    }

    log::debug!(
        "Parsed {} day headers and {} slots",
        timetable.days.len(),
        timetable.slots.len()
    );
    Ok(timetable)
}

/// Horizontal offset (percent) from an element's inline style.
fn left_offset(element: &ElementRef, pattern: &Regex) -> Option<f64> {
    let style = element.value().attr("style")?;
    pattern
        .captures(style)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Text of every match of `selector` under `element`, trimmed at both ends.
///
/// Inner whitespace is kept as rendered; stored rows compare on it.
fn child_text(element: &ElementRef, selector: &Selector) -> String {
    let text: String = element
        .select(selector)
        .flat_map(|child| child.text())
        .collect();
    text.trim().to_string()
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
