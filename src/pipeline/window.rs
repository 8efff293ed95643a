//! Look-ahead target dates and the notification window.

use chrono::{Datelike, Months, NaiveDate, TimeDelta, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

/// Current calendar date in `tz`.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Days from `from` forward to the next `to` (0 when equal).
fn days_until(from: Weekday, to: Weekday) -> i64 {
    i64::from((to.num_days_from_monday() + 7 - from.num_days_from_monday()) % 7)
}

/// Dates whose week pages are fetched in one run.
///
/// Occurrences of `weekday` starting on or after `today`, up to and
/// including `today + horizon_months`, keeping at most `limit`.
pub fn target_dates(
    today: NaiveDate,
    weekday: Weekday,
    horizon_months: u32,
    limit: usize,
) -> Vec<NaiveDate> {
    let horizon = today
        .checked_add_months(Months::new(horizon_months))
        .unwrap_or(NaiveDate::MAX);
    let first = today + TimeDelta::days(days_until(today.weekday(), weekday));

    std::iter::successors(Some(first), |d| d.checked_add_signed(TimeDelta::days(7)))
        .take_while(|d| *d <= horizon)
        .take(limit)
        .collect()
}

/// Week during which newly scheduled slots are announced.
///
/// Spans `[start, start + 7 days)` where `start` is the most recent anchor
/// weekday on or before the reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl NotificationWindow {
    pub fn current(today: NaiveDate, anchor: Weekday) -> Self {
        let start = today - TimeDelta::days(days_until(anchor, today.weekday()));
        Self {
            start,
            end: start + TimeDelta::days(7),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_target_dates_from_monday() {
        // 2024-03-11 is a Monday
        let dates = target_dates(d(2024, 3, 11), Weekday::Tue, 1, 5);
        assert_eq!(
            dates,
            vec![d(2024, 3, 12), d(2024, 3, 19), d(2024, 3, 26), d(2024, 4, 2), d(2024, 4, 9)]
        );
    }

    #[test]
    fn test_target_dates_include_today() {
        let dates = target_dates(d(2024, 3, 12), Weekday::Tue, 1, 5);
        assert_eq!(dates[0], d(2024, 3, 12));
        // horizon is inclusive: 2024-04-12 bounds the list at 2024-04-09
        assert_eq!(dates.last(), Some(&d(2024, 4, 9)));
    }

    #[test]
    fn test_target_dates_bounded_by_horizon() {
        // February window: 2024-02-01 (Thu) to 2024-03-01
        let dates = target_dates(d(2024, 2, 1), Weekday::Tue, 1, 10);
        assert_eq!(
            dates,
            vec![d(2024, 2, 6), d(2024, 2, 13), d(2024, 2, 20), d(2024, 2, 27)]
        );
    }

    #[test]
    fn test_target_dates_limit() {
        let dates = target_dates(d(2024, 3, 11), Weekday::Tue, 6, 3);
        assert_eq!(dates.len(), 3);
    }

    #[test]
    fn test_target_dates_cross_year() {
        let dates = target_dates(d(2024, 12, 20), Weekday::Tue, 1, 5);
        assert_eq!(dates[0], d(2024, 12, 24));
        assert_eq!(dates[2], d(2025, 1, 7));
    }

    #[test]
    fn test_window_anchored_on_previous_thursday() {
        // 2024-03-12 is a Tuesday; previous Thursday is 2024-03-07
        let window = NotificationWindow::current(d(2024, 3, 12), Weekday::Thu);
        assert_eq!(window.start, d(2024, 3, 7));
        assert_eq!(window.end, d(2024, 3, 14));
        assert!(window.contains(d(2024, 3, 7)));
        assert!(window.contains(d(2024, 3, 13)));
        assert!(!window.contains(d(2024, 3, 14)));
        assert!(!window.contains(d(2024, 3, 6)));
    }

    #[test]
    fn test_window_starts_today_on_anchor_day() {
        let window = NotificationWindow::current(d(2024, 3, 14), Weekday::Thu);
        assert_eq!(window.start, d(2024, 3, 14));
        assert!(window.contains(d(2024, 3, 19)));
        assert!(!window.contains(d(2024, 3, 21)));
    }

    #[test]
    fn test_today_in_timezones_differ_by_at_most_one_day() {
        let paris = today_in(chrono_tz::Europe::Paris);
        let auckland = today_in(chrono_tz::Pacific::Auckland);
        assert!((auckland - paris).num_days().abs() <= 1);
    }

    #[test]
    fn test_window_anchor_is_configurable() {
        let window = NotificationWindow::current(d(2024, 3, 12), Weekday::Mon);
        assert_eq!(window.start, d(2024, 3, 11));
        assert_eq!(window.end, d(2024, 3, 18));
    }
}
