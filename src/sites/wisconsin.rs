//! Madgrades (UW-Madison): subject pages list course links; course pages
//! summarize grade distributions.

use super::discovery::{TermSource, UnitSource};
use super::{ListingUrl, SiteConfig, TermSlice, TestLimits, units};
use crate::data::records::Field;
use crate::scraper::errors::ScrapeError;
use crate::scraper::extract::{
    CodeRule, DetailRules, EnrollmentTable, Extraction, FieldRule, TagRules, TitleRule, pattern,
};
use crate::scraper::pacing::{DelayPolicy, SitePacing};
use crate::scraper::paginate::PaginationRules;
use std::time::Duration;

pub const BASE_URL: &str = "https://madgrades.com";

fn course_links() -> Result<TagRules, ScrapeError> {
    let mut rules = TagRules::new("a[href]", CodeRule::href(r"/courses/([A-Z][A-Z0-9 &]*?)/(\d+)")?)?;
    rules.href_filter = Some(pattern(r"/courses/[^/]+/\d+")?);
    rules.title = Some(TitleRule::own_text());
    rules.link = true;
    Ok(rules)
}

fn course_page() -> Result<DetailRules, ScrapeError> {
    Ok(DetailRules {
        title: Some(TitleRule::new("h1", None)?),
        enrollment: EnrollmentTable::new().single(r"(?i)(\d+)\s+students")?,
        fields: vec![FieldRule::pattern(Field::Extra("avg_gpa"), r"(?i)Average GPA:?\s*([0-4]\.\d+)")?],
        test_limit: 5,
    })
}

pub fn config() -> Result<SiteConfig, ScrapeError> {
    Ok(SiteConfig {
        key: "wisconsin",
        name: "UW-Madison",
        base_url: BASE_URL.to_string(),
        dir: "uw_madison",
        stem: "madison_enrollment",
        render: false,
        proxy_timeout: None,
        requires_proxy: false,
        checkpoint: false,
        terms: TermSource::Unscoped,
        units: UnitSource::Links {
            page: "{base}/subjects",
            href: pattern(r"^/courses/([A-Z][A-Z0-9% &]*)$")?,
            min_name_len: 1,
        },
        fallback_units: units(&[
            ("COMP SCI", "Computer Sciences"),
            ("MATH", "Mathematics"),
            ("ECON", "Economics"),
            ("PSYCH", "Psychology"),
            ("CHEM", "Chemistry"),
            ("PHYSICS", "Physics"),
            ("ENGL", "English"),
            ("STAT", "Statistics"),
        ]),
        listing: ListingUrl::Template("{base}/courses/{unit}"),
        extraction: Extraction::Tagged(course_links()?),
        pagination: PaginationRules::single_page(),
        detail: Some(course_page()?),
        pacing: SitePacing {
            unit: DelayPolicy::Fixed(Duration::from_secs(2)),
            detail: DelayPolicy::Fixed(Duration::from_secs(1)),
            ..SitePacing::default()
        },
        test_limits: TestLimits {
            terms: TermSlice::All,
            units: 2,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records::CourseRecord;
    use html_scraper::Html;

    #[test]
    fn test_subject_course_links() {
        let site = config().unwrap();
        let Extraction::Tagged(rules) = &site.extraction else {
            panic!("expected tag rules");
        };
        let doc = Html::parse_document(
            r#"<a href="/subjects">All subjects</a>
               <a href="/courses/COMP%20SCI/300">Programming II</a>
               <a href="/courses/COMP%20SCI/400">Programming III</a>
               <a href="/courses/COMP%20SCI/300">Grades</a>"#,
        );
        let records = rules.extract_document(&doc, "https://madgrades.com/courses/COMP%20SCI");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].course_code, "COMP SCI 300");
        assert_eq!(records[0].subject.as_deref(), Some("COMP SCI"));
        assert_eq!(records[0].course_title.as_deref(), Some("Programming II"));
        assert_eq!(
            records[0].source_url.as_deref(),
            Some("https://madgrades.com/courses/COMP%20SCI/300")
        );
        assert_eq!(records[1].course_code, "COMP SCI 400");
    }

    #[test]
    fn test_course_page_summary() {
        let mut record = CourseRecord::new("MATH 221");
        course_page().unwrap().enrich(
            &mut record,
            "<html><body><h1>Calculus and Analytic Geometry 1</h1><p>1843 students</p><p>Average GPA: 2.87</p></body></html>",
        );
        assert_eq!(record.course_title.as_deref(), Some("Calculus and Analytic Geometry 1"));
        assert_eq!(record.enrolled, Some(1843));
        assert_eq!(record.extra["avg_gpa"], serde_json::json!(2.87));
    }
}
