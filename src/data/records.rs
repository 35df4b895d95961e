//! Course records and the term/unit descriptors they are scraped under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One course offering as scraped from a listing or API payload.
///
/// `course_code` is the only mandatory field. Identity is `(course_code, term)`,
/// but duplicates are kept as scraped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub course_code: String,
    pub course_title: Option<String>,
    pub subject: Option<String>,
    pub department: Option<String>,
    pub school: Option<String>,
    /// Term identifier code as used by the source (e.g. `20242025`, `1262`).
    pub term: Option<String>,
    pub term_label: Option<String>,
    /// Enrollment as displayed: `"5/10"` for a paired match, `"9"` for a single value.
    pub enrollment: Option<String>,
    pub enrolled: Option<u32>,
    pub capacity: Option<u32>,
    /// Over-enrolled sections report negative values.
    pub seats_open: Option<i32>,
    pub waitlist: Option<u32>,
    pub instructor: Option<String>,
    pub units: Option<String>,
    pub schedule: Option<String>,
    pub class_number: Option<String>,
    pub section: Option<String>,
    pub status: Option<String>,
    pub distribution_area: Option<String>,
    pub source_url: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
    /// Payload fields and site-specific extras, flattened into the JSON output.
    #[serde(flatten, default)]
    pub extra: Map<String, Value>,
}

/// A record attribute that extraction rules can populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Enrolled,
    Capacity,
    SeatsOpen,
    Waitlist,
    Instructor,
    Units,
    Schedule,
    ClassNumber,
    Section,
    Status,
    DistributionArea,
    TermLabel,
    /// Stored under the given key in [`CourseRecord::extra`].
    Extra(&'static str),
}

impl CourseRecord {
    pub fn new(course_code: impl Into<String>) -> Self {
        Self {
            course_code: course_code.into(),
            ..Self::default()
        }
    }

    pub fn is_set(&self, field: Field) -> bool {
        match field {
            Field::Title => self.course_title.is_some(),
            Field::Enrolled => self.enrolled.is_some(),
            Field::Capacity => self.capacity.is_some(),
            Field::SeatsOpen => self.seats_open.is_some(),
            Field::Waitlist => self.waitlist.is_some(),
            Field::Instructor => self.instructor.is_some(),
            Field::Units => self.units.is_some(),
            Field::Schedule => self.schedule.is_some(),
            Field::ClassNumber => self.class_number.is_some(),
            Field::Section => self.section.is_some(),
            Field::Status => self.status.is_some(),
            Field::DistributionArea => self.distribution_area.is_some(),
            Field::TermLabel => self.term_label.is_some(),
            Field::Extra(key) => self.extra.contains_key(key),
        }
    }

    /// Set `field` from raw scraped text unless it already holds a value.
    ///
    /// Numeric fields ignore thousands separators; text that does not parse
    /// leaves the field absent. Returns whether the field was written.
    pub fn fill(&mut self, field: Field, raw: &str) -> bool {
        let raw = raw.trim();
        if raw.is_empty() || self.is_set(field) {
            return false;
        }
        let text = || Some(raw.to_string());
        match field {
            Field::Title => self.course_title = text(),
            Field::Enrolled => self.enrolled = parse_count(raw),
            Field::Capacity => self.capacity = parse_count(raw),
            Field::SeatsOpen => self.seats_open = raw.replace(',', "").parse().ok(),
            Field::Waitlist => self.waitlist = parse_count(raw),
            Field::Instructor => self.instructor = text(),
            Field::Units => self.units = text(),
            Field::Schedule => self.schedule = text(),
            Field::ClassNumber => self.class_number = text(),
            Field::Section => self.section = text(),
            Field::Status => self.status = text(),
            Field::DistributionArea => self.distribution_area = text(),
            Field::TermLabel => self.term_label = text(),
            Field::Extra(key) => {
                let value = match raw.replace(',', "").parse::<f64>() {
                    Ok(n) => serde_json::Number::from_f64(n)
                        .map(Value::Number)
                        .unwrap_or_else(|| Value::String(raw.to_string())),
                    Err(_) => Value::String(raw.to_string()),
                };
                self.extra.insert(key.to_string(), value);
            }
        }
        self.is_set(field)
    }

    /// Derive the displayed enrollment from the counts when no text was scraped.
    pub fn summarize_enrollment(&mut self) {
        if self.enrollment.is_some() {
            return;
        }
        self.enrollment = match (self.enrolled, self.capacity) {
            (Some(enrolled), Some(capacity)) => Some(format!("{enrolled}/{capacity}")),
            (Some(enrolled), None) => Some(enrolled.to_string()),
            _ => None,
        };
    }
}

fn parse_count(raw: &str) -> Option<u32> {
    raw.replace(',', "").parse().ok()
}

/// An academic term as enumerated from a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDescriptor {
    pub code: String,
    pub label: String,
    /// Extra URL template values such as `year` and `semester`.
    #[serde(default)]
    pub params: Vec<(String, String)>,
}

impl TermDescriptor {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
            params: Vec::new(),
        }
    }

    /// Stand-in for sites whose listings are not organised by term.
    pub fn unscoped() -> Self {
        Self::new("", "")
    }

    pub fn is_unscoped(&self) -> bool {
        self.code.is_empty()
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    /// Whether a user-supplied query selects this term: exact code or label fragment.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        !query.is_empty()
            && (self.code.eq_ignore_ascii_case(query)
                || self.label.to_lowercase().contains(&query.to_lowercase()))
    }
}

/// A department or subject listed within a term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub code: String,
    pub name: String,
    pub school: Option<String>,
    /// Absolute listing URL when the site links units directly.
    pub url: Option<String>,
    /// Catalog entry merged into every record of an API-payload unit.
    pub payload: Option<Map<String, Value>>,
}

impl Unit {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Running totals for a site run, persisted with the checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_courses: usize,
    #[serde(alias = "departments_processed")]
    pub units_processed: usize,
    pub errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- fill ---

    #[test]
    fn test_fill_negative_seats_open() {
        let mut record = CourseRecord::new("COS 126");
        assert!(record.fill(Field::SeatsOpen, "-3"));
        assert_eq!(record.seats_open, Some(-3));
    }

    #[test]
    fn test_fill_does_not_overwrite() {
        let mut record = CourseRecord::new("CS 106A");
        record.fill(Field::Enrolled, "12");
        assert!(!record.fill(Field::Enrolled, "40"));
        assert_eq!(record.enrolled, Some(12));
    }

    #[test]
    fn test_fill_thousands_separator() {
        let mut record = CourseRecord::new("ECON 1");
        record.fill(Field::Capacity, "1,250");
        assert_eq!(record.capacity, Some(1250));
    }

    #[test]
    fn test_fill_unparseable_count_stays_absent() {
        let mut record = CourseRecord::new("ECON 1");
        assert!(!record.fill(Field::Enrolled, "TBA"));
        assert_eq!(record.enrolled, None);
    }

    #[test]
    fn test_fill_extra_numeric_and_text() {
        let mut record = CourseRecord::new("CSE 8A");
        record.fill(Field::Extra("avg_gpa"), "3.25");
        record.fill(Field::Extra("note"), "closed");
        assert_eq!(record.extra["avg_gpa"], serde_json::json!(3.25));
        assert_eq!(record.extra["note"], "closed");
    }

    // --- serde ---

    #[test]
    fn test_extra_is_flattened_in_json() {
        let mut record = CourseRecord::new("COMPSCI 61A");
        record
            .extra
            .insert("abbreviation".to_string(), Value::String("COMPSCI".to_string()));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["abbreviation"], "COMPSCI");

        let back: CourseRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_summarize_enrollment_from_counts() {
        let mut paired = CourseRecord {
            enrolled: Some(12),
            capacity: Some(20),
            ..CourseRecord::new("COS 126")
        };
        paired.summarize_enrollment();
        assert_eq!(paired.enrollment.as_deref(), Some("12/20"));

        let mut kept = CourseRecord {
            enrollment: Some("9".to_string()),
            enrolled: Some(10),
            ..CourseRecord::new("CS 1U")
        };
        kept.summarize_enrollment();
        assert_eq!(kept.enrollment.as_deref(), Some("9"));
    }

    #[test]
    fn test_run_stats_accepts_legacy_key() {
        let stats: RunStats =
            serde_json::from_str(r#"{"total_courses": 4, "departments_processed": 2, "errors": 1}"#)
                .unwrap();
        assert_eq!(stats.units_processed, 2);
    }

    // --- TermDescriptor ---

    #[test]
    fn test_term_matches_code_or_label_fragment() {
        let term = TermDescriptor::new("1262", "Fall 25-26 Fall");
        assert!(term.matches("1262"));
        assert!(term.matches("25-26 fall"));
        assert!(!term.matches("1254"));
        assert!(!term.matches(" "));
    }
}
