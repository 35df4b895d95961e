//! Academic term parsing: season names, calendar inference, and term-code rules.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    Fall,
    Winter,
    Spring,
    Summer,
}

/// The term system a site's dates are interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// Autumn, Winter, Spring, Summer quarters.
    Quarter,
    /// Fall, Spring, Summer semesters.
    Semester,
}

impl Season {
    /// Parse a season name or the abbreviations used by registrars and CAPE.
    pub fn from_abbrev(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aut" | "autumn" | "fall" | "fa" => Some(Self::Fall),
            "win" | "winter" | "wi" => Some(Self::Winter),
            "spr" | "spring" | "sp" => Some(Self::Spring),
            "sum" | "summer" | "su" | "s1" | "s2" | "s3" => Some(Self::Summer),
            _ => None,
        }
    }

    pub fn label(self, calendar: Calendar) -> &'static str {
        match (self, calendar) {
            (Self::Fall, Calendar::Quarter) => "Autumn",
            (Self::Fall, Calendar::Semester) => "Fall",
            (Self::Winter, _) => "Winter",
            (Self::Spring, _) => "Spring",
            (Self::Summer, _) => "Summer",
        }
    }
}

impl Calendar {
    pub fn season_for_month(self, month: u32) -> Option<Season> {
        match self {
            Self::Quarter => match month {
                9..=12 => Some(Season::Fall),
                1..=3 => Some(Season::Winter),
                4..=5 => Some(Season::Spring),
                6..=8 => Some(Season::Summer),
                _ => None,
            },
            Self::Semester => match month {
                8..=12 => Some(Season::Fall),
                1..=5 => Some(Season::Spring),
                6..=7 => Some(Season::Summer),
                _ => None,
            },
        }
    }
}

/// Normalize explicit term text such as `"Aut"`, `"Spr 2024"`, or `"FA23"`.
///
/// Two-digit years are read as 20xx. Unrecognized seasons yield `None`.
pub fn normalize_term_label(raw: &str, calendar: Calendar) -> Option<String> {
    static TERM_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\s*([A-Za-z]+\d?)(?:\s*(\d{4}|\d{2}))?\s*$").unwrap());

    let Some(caps) = TERM_RE.captures(raw) else {
        debug!(term = raw, "Unrecognized term format");
        return None;
    };
    // "S1"-style summer sessions keep their digit in the season token.
    let season = Season::from_abbrev(&caps[1])?.label(calendar);
    match caps.get(2).map(|m| m.as_str()) {
        Some(year) if year.len() == 2 => Some(format!("{season} 20{year}")),
        Some(year) => Some(format!("{season} {year}")),
        None => Some(season.to_string()),
    }
}

/// Infer the season from the first date of a range like `"9/24/2024 - 12/13/2024"`.
pub fn season_from_date_range(schedule: &str, calendar: Calendar) -> Option<Season> {
    static DATE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\d{1,2}/\d{1,2}/\d{4})").unwrap());

    let start = DATE_RE.captures(schedule)?;
    let date = NaiveDate::parse_from_str(&start[1], "%m/%d/%Y").ok()?;
    calendar.season_for_month(date.month())
}

/// Academic-year term code and label, e.g. `("20242025", "2024-2025")`.
pub fn academic_year(start_year: i32) -> (String, String) {
    (
        format!("{}{}", start_year, start_year + 1),
        format!("{}-{}", start_year, start_year + 1),
    )
}

/// Lou's List semester code `1YYS`: century digit, two-digit year, season digit
/// (2 Spring, 6 Summer, 8 Fall).
pub fn uva_semester_code(year: i32, season: Season) -> Option<String> {
    let digit = match season {
        Season::Spring => 2,
        Season::Summer => 6,
        Season::Fall => 8,
        Season::Winter => return None,
    };
    Some(format!("1{:02}{}", year.rem_euclid(100), digit))
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Season ---

    #[test]
    fn test_season_from_abbrev() {
        assert_eq!(Season::from_abbrev("Aut"), Some(Season::Fall));
        assert_eq!(Season::from_abbrev("win"), Some(Season::Winter));
        assert_eq!(Season::from_abbrev("SP"), Some(Season::Spring));
        assert_eq!(Season::from_abbrev("S2"), Some(Season::Summer));
        assert_eq!(Season::from_abbrev("Harvest"), None);
    }

    #[test]
    fn test_season_label_by_calendar() {
        assert_eq!(Season::Fall.label(Calendar::Quarter), "Autumn");
        assert_eq!(Season::Fall.label(Calendar::Semester), "Fall");
    }

    // --- Calendar ---

    #[test]
    fn test_quarter_months() {
        let q = Calendar::Quarter;
        assert_eq!(q.season_for_month(9), Some(Season::Fall));
        assert_eq!(q.season_for_month(12), Some(Season::Fall));
        assert_eq!(q.season_for_month(1), Some(Season::Winter));
        assert_eq!(q.season_for_month(3), Some(Season::Winter));
        assert_eq!(q.season_for_month(4), Some(Season::Spring));
        assert_eq!(q.season_for_month(5), Some(Season::Spring));
        assert_eq!(q.season_for_month(6), Some(Season::Summer));
        assert_eq!(q.season_for_month(8), Some(Season::Summer));
        assert_eq!(q.season_for_month(13), None);
    }

    #[test]
    fn test_semester_months() {
        let s = Calendar::Semester;
        assert_eq!(s.season_for_month(8), Some(Season::Fall));
        assert_eq!(s.season_for_month(1), Some(Season::Spring));
        assert_eq!(s.season_for_month(7), Some(Season::Summer));
    }

    // --- normalize_term_label ---

    #[test]
    fn test_normalize_abbreviation_only() {
        assert_eq!(normalize_term_label("Aut", Calendar::Quarter).as_deref(), Some("Autumn"));
    }

    #[test]
    fn test_normalize_with_year() {
        assert_eq!(
            normalize_term_label("Spr 2024", Calendar::Quarter).as_deref(),
            Some("Spring 2024")
        );
        assert_eq!(
            normalize_term_label("FA23", Calendar::Semester).as_deref(),
            Some("Fall 2023")
        );
        assert_eq!(
            normalize_term_label("S1 24", Calendar::Quarter).as_deref(),
            Some("Summer 2024")
        );
    }

    #[test]
    fn test_normalize_unknown() {
        assert_eq!(normalize_term_label("Block 3", Calendar::Quarter), None);
        assert_eq!(normalize_term_label("", Calendar::Quarter), None);
    }

    // --- dates ---

    #[test]
    fn test_season_from_date_range() {
        assert_eq!(
            season_from_date_range("9/24/2024 - 12/13/2024", Calendar::Quarter),
            Some(Season::Fall)
        );
        assert_eq!(
            season_from_date_range("Dates: 01/06/2025 - 03/14/2025", Calendar::Quarter),
            Some(Season::Winter)
        );
        assert_eq!(season_from_date_range("TBA", Calendar::Quarter), None);
    }

    // --- codes ---

    #[test]
    fn test_academic_year() {
        assert_eq!(
            academic_year(2024),
            ("20242025".to_string(), "2024-2025".to_string())
        );
    }

    #[test]
    fn test_uva_semester_codes() {
        assert_eq!(uva_semester_code(2024, Season::Fall).as_deref(), Some("1248"));
        assert_eq!(uva_semester_code(2025, Season::Spring).as_deref(), Some("1252"));
        assert_eq!(uva_semester_code(2018, Season::Summer).as_deref(), Some("1186"));
        assert_eq!(uva_semester_code(2024, Season::Winter), None);
    }
}
