//! Stanford ExploreCourses: academic years, departments grouped by school,
//! catalog search pages anchored on course headings.

use super::discovery::{TermSource, UnitSource};
use super::{ListingUrl, SiteConfig, TermSlice, TestLimits};
use crate::data::records::{Field, TermDescriptor};
use crate::scraper::errors::ScrapeError;
use crate::scraper::extract::{
    CodeRule, ContextScope, EnrollmentTable, Extraction, FieldRule, TagRules, TermRule, pattern, selector,
};
use crate::scraper::pacing::SitePacing;
use crate::scraper::paginate::{Advance, NextControl, PaginationRules};
use crate::scraper::terms::{Calendar, academic_year};

pub const BASE_URL: &str = "https://explorecourses.stanford.edu";

/// Paired enrollment/capacity shapes, most specific first.
const PAIRED: &[&str] = &[
    r"(?i)Students enrolled:\s*(\d+)\s*/\s*(\d+)",
    r"(?i)enrolled:\s*(\d+)\s*/\s*(\d+)",
    r"(?i)(\d+)\s*/\s*(\d+)\s*students",
    r"(?i)Enrollment:\s*(\d+)\s*/\s*(\d+)",
    r"(?i)(\d+)\s*enrolled.*?(\d+)\s*capacity",
    r"(?i)Current enrollment:\s*(\d+).*?Max enrollment:\s*(\d+)",
    r"(?i)Enrolled:\s*(\d+).*?Capacity:\s*(\d+)",
    r"(?i)Schedule.*?(\d+)\s*/\s*(\d+)",
    r"(?i)Section.*?(\d+)\s*/\s*(\d+)",
];

/// Enrollment without capacity. A number followed by `/` is never taken.
const SINGLE: &[&str] = &[
    r"(?i)Students enrolled:\s*(\d+)",
    r"(?i)Enrolled:\s*(\d+)",
    r"(?i)Current enrollment:\s*(\d+)",
    r"(?i)(\d+)\s+students?\s+enrolled",
    r"(?i)Enrollment:\s*(\d+)",
    r"(?i)Class size:\s*(\d+)",
    r"(?i)Total enrolled:\s*(\d+)",
];

const TERM_PATTERNS: &[&str] = &[
    r"(?i)Session:\s*\d{4}-\d{4}\s+(Autumn|Winter|Spring|Summer)",
    r"(?i)\b(Autumn|Winter|Spring|Summer)\s+\d{4}",
    r"(?i)\b(Aut|Win|Spr|Sum)\s+\d{4}",
    r"(?i)Terms?:\s*(Autumn|Winter|Spring|Summer|Aut|Win|Spr|Sum)\b",
];

pub fn enrollment_table() -> Result<EnrollmentTable, ScrapeError> {
    let table = PAIRED
        .iter()
        .try_fold(EnrollmentTable::new(), |table, re| table.paired(re))?;
    SINGLE.iter().try_fold(table, |table, re| table.single(re))
}

fn fallback_years() -> Vec<TermDescriptor> {
    (2021..=2024)
        .map(|year| {
            let (code, label) = academic_year(year);
            TermDescriptor::new(code, label)
        })
        .collect()
}

pub fn config() -> Result<SiteConfig, ScrapeError> {
    let mut rules = TagRules::new(
        "h2",
        CodeRule::text(None, r"^([A-Z]+\s+\d+[A-Z]*):\s*(?P<title>.+)")?,
    )?;
    rules.context = ContextScope::Parent;
    rules.enrollment = enrollment_table()?;
    rules.fields = vec![
        FieldRule::pattern(Field::Units, r"(?i)\bUnits?:\s*(\d+(?:-\d+)?)")?,
        FieldRule::pattern(Field::Units, r"(?i)(\d+(?:-\d+)?)\s*units?\b")?,
        FieldRule::pattern(Field::Instructor, r"(?i)Instructors?:\s*([^.\n]+)")?,
        FieldRule::pattern(
            Field::Schedule,
            r"(\d{1,2}/\d{1,2}/\d{4}\s*-\s*\d{1,2}/\d{1,2}/\d{4})",
        )?,
        FieldRule::pattern(Field::ClassNumber, r"Class #\s*(\d+)")?,
    ];
    rules.term = TermRule {
        patterns: TERM_PATTERNS.iter().map(|re| pattern(re)).collect::<Result<_, _>>()?,
        calendar: Some(Calendar::Quarter),
    };

    Ok(SiteConfig {
        key: "stanford",
        name: "Stanford University",
        base_url: BASE_URL.to_string(),
        dir: "stanford",
        stem: "stanford_enrollment",
        render: false,
        proxy_timeout: None,
        requires_proxy: true,
        checkpoint: true,
        terms: TermSource::Links {
            page: "{base}",
            links: selector("table#years a[href]")?,
            code: pattern(r"academicYear=(\d{8})")?,
            fallback: fallback_years(),
        },
        units: UnitSource::GroupedLinks {
            page: "{base}/browse?academicYear={term}",
            container: selector("div.departmentsContainer")?,
            header: selector("h2.schoolName")?,
            entry: pattern(r"(.+?)\s*\(([A-Z]+)\)")?,
        },
        fallback_units: Vec::new(),
        listing: ListingUrl::Template(
            "{base}/search?view=catalog&academicYear={term}&page={page}&q={unit}\
             &filter-coursestatus-Active=on&filter-departmentcode-{unit}=on",
        ),
        extraction: Extraction::Tagged(rules),
        pagination: PaginationRules {
            counter: None,
            next: Some(NextControl::new("a[href]", Some("next"), Some("disabled"))?),
            advance: Advance::Template { start: 0 },
            max_pages: 20,
        },
        detail: None,
        pacing: SitePacing::default(),
        test_limits: TestLimits {
            terms: TermSlice::Last(1),
            units: 3,
        },
    })
}
