//! Princeton course offerings: term dropdown, one results table per term,
//! paged through a "Displaying X to Y of Z" counter and a next link.

use super::discovery::{TermSource, UnitSource};
use super::{ListingUrl, SiteConfig, TermSlice, TestLimits};
use crate::data::records::Field;
use crate::scraper::errors::ScrapeError;
use crate::scraper::extract::{CodeRule, Extraction, FieldRule, TagRules, TitleRule, pattern, selector};
use crate::scraper::pacing::{DelayPolicy, SitePacing};
use crate::scraper::paginate::{Advance, NextControl, PaginationRules};
use std::time::Duration;

pub const BASE_URL: &str = "https://registrar.princeton.edu/course-offerings";

fn row_rules() -> Result<TagRules, ScrapeError> {
    let mut rules = TagRules::new(
        "tr",
        CodeRule::text(Some("td.class-info small.catalog-number"), r"([A-Z]{3})\s*(\d{3}[A-Z]?)")?,
    )?;
    rules.title = Some(TitleRule::new("td.class-info a", Some(r"\(Link opens in new window\)"))?);
    rules.fields = vec![
        FieldRule::pattern(Field::Enrolled, r"Seats Enrolled:\s*(\d+)")?,
        FieldRule::pattern(Field::Capacity, r"Total Seats:\s*(\d+)")?,
        FieldRule::pattern(Field::SeatsOpen, r"Seats Open:\s*(-?\d+)")?,
        FieldRule::selector(Field::DistributionArea, "td.class-distarea")?,
        FieldRule::selector(Field::Status, "td.class-status")?,
    ];
    Ok(rules)
}

pub fn config() -> Result<SiteConfig, ScrapeError> {
    Ok(SiteConfig {
        key: "princeton",
        name: "Princeton University",
        base_url: BASE_URL.to_string(),
        dir: "princeton",
        stem: "princeton_enrollment",
        render: true,
        proxy_timeout: Some(Duration::from_secs(90)),
        requires_proxy: true,
        checkpoint: false,
        terms: TermSource::Dropdown {
            page: "{base}",
            select: selector("select[name*='term']")?,
        },
        units: UnitSource::Single,
        fallback_units: Vec::new(),
        listing: ListingUrl::Template("{base}?term={term}"),
        extraction: Extraction::Tagged(row_rules()?),
        pagination: PaginationRules {
            counter: Some(pattern(r"(?i)Displaying\s+(\d+)\s+to\s+(\d+)\s+of\s+(\d+)\s+classes")?),
            next: Some(NextControl::new("a[href]", Some("next"), Some("disabled"))?),
            advance: Advance::FollowNext,
            max_pages: 30,
        },
        detail: None,
        pacing: SitePacing {
            page: DelayPolicy::uniform_secs(8, 15),
            term: DelayPolicy::uniform_secs(45, 75),
            ..SitePacing::default()
        },
        test_limits: TestLimits {
            terms: TermSlice::First(1),
            units: 0,
        },
    })
}
