//! French calendar vocabulary used by the portal and by notifications.

use chrono::{Datelike, NaiveDate, Weekday};

const MONTHS: [&str; 12] = [
    "janvier",
    "février",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "août",
    "septembre",
    "octobre",
    "novembre",
    "décembre",
];

/// Lowercase French name of a weekday.
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "lundi",
        Weekday::Tue => "mardi",
        Weekday::Wed => "mercredi",
        Weekday::Thu => "jeudi",
        Weekday::Fri => "vendredi",
        Weekday::Sat => "samedi",
        Weekday::Sun => "dimanche",
    }
}

/// Lowercase French name of a month (1-based).
pub fn month_name(month: u32) -> Option<&'static str> {
    MONTHS.get(month.checked_sub(1)? as usize).copied()
}

/// Parse a French month name, ignoring case and accents.
pub fn parse_month(text: &str) -> Option<u32> {
    let wanted = fold(text);
    MONTHS
        .iter()
        .position(|name| fold(name) == wanted)
        .map(|idx| idx as u32 + 1)
}

/// Format a date as `mardi 12 mars`.
pub fn long_day(date: NaiveDate) -> String {
    format!(
        "{} {:02} {}",
        weekday_name(date.weekday()),
        date.day(),
        month_name(date.month()).unwrap_or_default()
    )
}

fn fold(text: &str) -> String {
    text.trim()
        .trim_end_matches('.')
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'û' | 'ù' | 'ü' => 'u',
            'à' | 'â' => 'a',
            'ô' => 'o',
            'î' | 'ï' => 'i',
            'ç' => 'c',
            other => other,
        })
        .collect()
}
