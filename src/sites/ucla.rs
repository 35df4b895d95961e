//! Hotseat (UCLA): department pages link every course, and each course page
//! carries the enrollment history.

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

pub const BASE_URL: &str = "https://hotseat.io";

const COURSE_HREF: &str = r"/courses/\d+";

fn course_links() -> Result<TagRules, ScrapeError> {
    let mut rules = TagRules::new(
        "a[href]",
        CodeRule::text(
            None,
            r"^([A-Z][A-Z&\s]*?\s+[A-Z]?\d+[A-Z]*)(?:\s*[-:]\s*(?P<title>.+))?$",
        )?,
    )?;
    rules.href_filter = Some(pattern(COURSE_HREF)?);
    rules.link = true;

    // Course cards without a readable code are kept under their numeric id.
    let mut by_id = TagRules::new("a[href]", CodeRule::href(r"/courses/(\d+)")?)?;
    by_id.href_filter = Some(pattern(COURSE_HREF)?);
    by_id.title = Some(TitleRule::own_text());
    by_id.link = true;
    rules.fallback = Some(Box::new(by_id));
    Ok(rules)
}

fn course_page() -> Result<DetailRules, ScrapeError> {
    Ok(DetailRules {
        title: Some(TitleRule::new("h1", None)?),
        enrollment: EnrollmentTable::new().single(r"(?i)(\d+)\s+(?:students?\s+)?enrolled")?,
        fields: vec![
            FieldRule::selector_all(Field::Instructor, "a[href*='/instructors/']")?,
            FieldRule::pattern(Field::Extra("review_count"), r"(?i)(\d+)\s*reviews?")?,
        ],
        test_limit: 5,
    })
}

pub fn config() -> Result<SiteConfig, ScrapeError> {
    Ok(SiteConfig {
        key: "ucla",
        name: "UCLA",
        base_url: BASE_URL.to_string(),
        dir: "ucla",
        stem: "ucla_enrollment",
        render: true,
        proxy_timeout: Some(Duration::from_secs(90)),
        requires_proxy: false,
        checkpoint: false,
        terms: TermSource::Unscoped,
        units: UnitSource::Links {
            page: "{base}/departments",
            href: pattern(r"/departments/([^/?#]+)")?,
            min_name_len: 3,
        },
        fallback_units: units(&[
            ("computer-science", "Computer Science"),
            ("mathematics", "Mathematics"),
            ("economics", "Economics"),
            ("psychology", "Psychology"),
            ("engineering", "Engineering"),
            ("chemistry", "Chemistry"),
            ("physics", "Physics"),
            ("english", "English"),
        ]),
        listing: ListingUrl::UnitLink {
            otherwise: Some("{base}/departments/{unit}"),
        },
        extraction: Extraction::Tagged(course_links()?),
        pagination: PaginationRules::single_page(),
        detail: Some(course_page()?),
        pacing: SitePacing {
            unit: DelayPolicy::Fixed(Duration::from_secs(3)),
            detail: DelayPolicy::Fixed(Duration::from_secs(2)),
            ..SitePacing::default()
        },
        test_limits: TestLimits {
            terms: TermSlice::All,
            units: 2,
        },
    })
}
