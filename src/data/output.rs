//! Tabular (CSV) and structured (JSON array) output files, one pair per site.

use crate::data::records::{CourseRecord, TermDescriptor};
use crate::scraper::errors::ScrapeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where a site's dataset lives: `<dir>/<stem>.csv` and `<dir>/<stem>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            csv: dir.join(format!("{stem}.csv")),
            json: dir.join(format!("{stem}.json")),
        }
    }

    /// Either file is present from an earlier run.
    pub fn exists(&self) -> bool {
        self.csv.exists() || self.json.exists()
    }
}

/// Flat CSV shape of a [`CourseRecord`]; the extras map travels as a JSON string.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    course_code: String,
    course_title: Option<String>,
    subject: Option<String>,
    department: Option<String>,
    school: Option<String>,
    term: Option<String>,
    term_label: Option<String>,
    enrollment: Option<String>,
    enrolled: Option<u32>,
    capacity: Option<u32>,
    seats_open: Option<i32>,
    waitlist: Option<u32>,
    instructor: Option<String>,
    units: Option<String>,
    schedule: Option<String>,
    class_number: Option<String>,
    section: Option<String>,
    status: Option<String>,
    distribution_area: Option<String>,
    source_url: Option<String>,
    scraped_at: Option<DateTime<Utc>>,
    extra: Option<String>,
}

impl From<&CourseRecord> for CsvRow {
    fn from(r: &CourseRecord) -> Self {
        Self {
            course_code: r.course_code.clone(),
            course_title: r.course_title.clone(),
            subject: r.subject.clone(),
            department: r.department.clone(),
            school: r.school.clone(),
            term: r.term.clone(),
            term_label: r.term_label.clone(),
            enrollment: r.enrollment.clone(),
            enrolled: r.enrolled,
            capacity: r.capacity,
            seats_open: r.seats_open,
            waitlist: r.waitlist,
            instructor: r.instructor.clone(),
            units: r.units.clone(),
            schedule: r.schedule.clone(),
            class_number: r.class_number.clone(),
            section: r.section.clone(),
            status: r.status.clone(),
            distribution_area: r.distribution_area.clone(),
            source_url: r.source_url.clone(),
            scraped_at: r.scraped_at,
            extra: (!r.extra.is_empty())
                .then(|| serde_json::Value::Object(r.extra.clone()).to_string()),
        }
    }
}

impl TryFrom<CsvRow> for CourseRecord {
    type Error = serde_json::Error;

    fn try_from(row: CsvRow) -> Result<Self, Self::Error> {
        let extra = match row.extra.as_deref().filter(|s| !s.is_empty()) {
            Some(json) => serde_json::from_str(json)?,
            None => serde_json::Map::new(),
        };
        Ok(Self {
            course_code: row.course_code,
            course_title: row.course_title,
            subject: row.subject,
            department: row.department,
            school: row.school,
            term: row.term,
            term_label: row.term_label,
            enrollment: row.enrollment,
            enrolled: row.enrolled,
            capacity: row.capacity,
            seats_open: row.seats_open,
            waitlist: row.waitlist,
            instructor: row.instructor,
            units: row.units,
            schedule: row.schedule,
            class_number: row.class_number,
            section: row.section,
            status: row.status,
            distribution_area: row.distribution_area,
            source_url: row.source_url,
            scraped_at: row.scraped_at,
            extra,
        })
    }
}

/// Write both output files. An empty record set writes nothing.
pub fn write_outputs(paths: &OutputPaths, records: &[CourseRecord]) -> Result<bool, ScrapeError> {
    if records.is_empty() {
        warn!(path = %paths.csv.display(), "No records to save");
        return Ok(false);
    }

    if let Some(parent) = paths.csv.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::WriterBuilder::new().from_path(&paths.csv)?;
    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }
    writer.flush()?;

    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(&paths.json, json)?;

    info!(
        count = records.len(),
        csv = %paths.csv.display(),
        json = %paths.json.display(),
        "Saved records"
    );
    Ok(true)
}

/// Read a previously written CSV back into records.
pub fn read_csv(path: &Path) -> Result<Vec<CourseRecord>, ScrapeError> {
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        records.push(CourseRecord::try_from(row?)?);
    }
    Ok(records)
}

/// Replace one term's rows in the dataset with `fresh`.
///
/// Existing rows whose term code or label equals the term's are dropped, the
/// fresh rows appended, and the result sorted by `(term, course_code)` before
/// both files are rewritten. Returns the number of rows in the merged dataset.
pub fn merge_term(
    paths: &OutputPaths,
    term: &TermDescriptor,
    fresh: Vec<CourseRecord>,
) -> Result<usize, ScrapeError> {
    let mut merged = if paths.csv.exists() {
        read_csv(&paths.csv)?
    } else {
        warn!(path = %paths.csv.display(), "No existing dataset, update will create it");
        Vec::new()
    };

    let before = merged.len();
    merged.retain(|r| {
        r.term.as_deref() != Some(term.code.as_str())
            && r.term_label.as_deref() != Some(term.label.as_str())
    });
    info!(
        term = term.label.as_str(),
        removed = before - merged.len(),
        added = fresh.len(),
        "Merging term into dataset"
    );

    merged.extend(fresh);
    merged.sort_by(|a, b| {
        a.term
            .as_deref()
            .unwrap_or_default()
            .cmp(b.term.as_deref().unwrap_or_default())
            .then_with(|| a.course_code.cmp(&b.course_code))
    });

    write_outputs(paths, &merged)?;
    Ok(merged.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, term: &str, enrolled: u32) -> CourseRecord {
        CourseRecord {
            term: Some(term.to_string()),
            term_label: Some(format!("Term {term}")),
            enrolled: Some(enrolled),
            ..CourseRecord::new(code)
        }
    }

    #[test]
    fn test_empty_records_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::new(dir.path(), "uva_enrollment");
        assert!(!write_outputs(&paths, &[]).unwrap());
        assert!(!paths.exists());
    }

    #[test]
    fn test_csv_preserves_extras_and_negative_seats() {
        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::new(&dir.path().join("princeton"), "princeton_enrollment");

        let mut r = record("COS 126", "1262", 150);
        r.seats_open = Some(-3);
        r.extra.insert("review_count".to_string(), serde_json::json!(12));
        assert!(write_outputs(&paths, std::slice::from_ref(&r)).unwrap());
        assert!(paths.exists());

        let back = read_csv(&paths.csv).unwrap();
        assert_eq!(back, vec![r]);

        let json: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(json[0]["review_count"], 12);
        assert_eq!(json[0]["seats_open"], -3);
    }

    #[test]
    fn test_merge_term_replaces_only_that_term() {
        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::new(dir.path(), "princeton_enrollment");
        write_outputs(
            &paths,
            &[
                record("MAT 201", "1254", 90),
                record("COS 126", "1262", 100),
                record("COS 217", "1262", 80),
            ],
        )
        .unwrap();

        let term = TermDescriptor::new("1262", "Term 1262");
        let total = merge_term(
            &paths,
            &term,
            vec![record("COS 333", "1262", 60), record("COS 126", "1262", 140)],
        )
        .unwrap();
        assert_eq!(total, 3);

        let merged = read_csv(&paths.csv).unwrap();
        let keys: Vec<_> = merged
            .iter()
            .map(|r| (r.term.clone().unwrap(), r.course_code.clone(), r.enrolled))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("1254".to_string(), "MAT 201".to_string(), Some(90)),
                ("1262".to_string(), "COS 126".to_string(), Some(140)),
                ("1262".to_string(), "COS 333".to_string(), Some(60)),
            ]
        );
    }

    #[test]
    fn test_merge_without_existing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::new(dir.path(), "stanford_enrollment");
        let term = TermDescriptor::new("20242025", "2024-2025");
        assert_eq!(
            merge_term(&paths, &term, vec![record("CS 106A", "20242025", 300)]).unwrap(),
            1
        );
    }
}
