//! CAPE (UC San Diego): course evaluation results per department, one table
//! row per course offering.

use super::discovery::{TermSource, UnitSource};
use super::{ListingUrl, SiteConfig, TermSlice, TestLimits, units};
use crate::data::records::Field;
use crate::scraper::errors::ScrapeError;
use crate::scraper::extract::{CodeRule, Extraction, FieldRule, TagRules, TermRule, pattern, selector};
use crate::scraper::pacing::{DelayPolicy, SitePacing};
use crate::scraper::paginate::PaginationRules;
use crate::scraper::terms::Calendar;
use std::time::Duration;

pub const BASE_URL: &str = "https://cape.ucsd.edu";

fn evaluation_rows() -> Result<TagRules, ScrapeError> {
    let mut rules = TagRules::new(
        "tr",
        CodeRule::text(
            Some("td"),
            r"^([A-Z]+)\s*(\d+[A-Z]*)(?:\s*-\s*(?P<title>.+?))?(?:\s*\([A-Z]\))?$",
        )?,
    )?;
    rules.fields = vec![
        FieldRule::selector_pattern(Field::Instructor, "td", r"^([A-Z][a-z]+,\s*[A-Z].*)$")?,
        FieldRule::selector_pattern(Field::Enrolled, "span[id*='Enroll']", r"^(\d+)$")?,
        FieldRule::selector_pattern(Field::Extra("evaluations_made"), "span[id*='Evals']", r"^(\d+)$")?,
        FieldRule::selector_pattern(Field::Extra("recommend_pct"), "td", r"(\d+\.?\d*)\s*%")?,
        FieldRule::selector_pattern(Field::Extra("avg_gpa"), "td", r"^([0-4]\.\d+)$")?,
    ];
    rules.term = TermRule {
        patterns: vec![pattern(r"\b((?:FA|WI|SP|S[123])\s*\d{2})\b")?],
        calendar: Some(Calendar::Semester),
    };
    Ok(rules)
}

pub fn config() -> Result<SiteConfig, ScrapeError> {
    Ok(SiteConfig {
        key: "ucsd",
        name: "UC San Diego",
        base_url: BASE_URL.to_string(),
        dir: "uc_san_diego",
        stem: "ucsd_enrollment",
        render: false,
        proxy_timeout: None,
        requires_proxy: false,
        checkpoint: false,
        terms: TermSource::Unscoped,
        units: UnitSource::Dropdown {
            page: "{base}/responses/",
            select: selector("select[name*='department' i]")?,
            link_fallback: Some(pattern(r"(?i)department=([A-Z]+)")?),
        },
        fallback_units: units(&[
            ("CSE", "Computer Science & Engineering"),
            ("MATH", "Mathematics"),
            ("COGS", "Cognitive Science"),
            ("ECON", "Economics"),
            ("PSYC", "Psychology"),
            ("BILD", "Biology Lower Division"),
            ("CHEM", "Chemistry"),
            ("PHYS", "Physics"),
        ]),
        listing: ListingUrl::Template("{base}/responses/Results.aspx?dept={unit}"),
        extraction: Extraction::Tagged(evaluation_rows()?),
        pagination: PaginationRules::single_page(),
        detail: None,
        pacing: SitePacing {
            unit: DelayPolicy::Fixed(Duration::from_secs(2)),
            ..SitePacing::default()
        },
        test_limits: TestLimits {
            terms: TermSlice::All,
            units: 3,
        },
    })
}
