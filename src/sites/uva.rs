//! Lou's List (UVA): one page per semester listing every section as a table row.

use super::discovery::{TermSource, UnitSource};
use super::{ListingUrl, SiteConfig, TermSlice, TestLimits};
use crate::data::records::{Field, TermDescriptor};
use crate::scraper::errors::ScrapeError;
use crate::scraper::extract::{CodeRule, EnrollmentTable, Extraction, FieldRule, TagRules};
use crate::scraper::pacing::{DelayPolicy, SitePacing};
use crate::scraper::paginate::PaginationRules;
use crate::scraper::terms::{Season, uva_semester_code};
use std::time::Duration;

pub const BASE_URL: &str = "https://louslist.org";

const FIRST_FALL: i32 = 2018;
const LAST_FALL: i32 = 2025;

/// Each academic year contributes its fall and the following spring.
fn semesters() -> Vec<TermDescriptor> {
    (FIRST_FALL..=LAST_FALL)
        .flat_map(|year| [(year, Season::Fall, "Fall"), (year + 1, Season::Spring, "Spring")])
        .filter_map(|(year, season, name)| {
            let code = uva_semester_code(year, season)?;
            Some(TermDescriptor::new(code, format!("{name} {year}")))
        })
        .collect()
}

fn section_rows() -> Result<TagRules, ScrapeError> {
    let mut rules = TagRules::new("tr", CodeRule::text(Some("td"), r"^([A-Z]{2,4})\s*(\d{4})")?)?;
    rules.enrollment = EnrollmentTable::new().paired(r"(\d+)\s*/\s*(\d+)")?;
    rules.fields = vec![
        FieldRule::pattern(Field::Waitlist, r"(?i)Wait(?:list)?:\s*(\d+)")?,
        FieldRule::selector(Field::Instructor, "td.instructor")?,
    ];

    let mut links = TagRules::new(
        "a[href*='courseCode=']",
        CodeRule::text(None, r"([A-Z]{2,4})\s*(\d{4})(?:\s+(?P<title>.+))?")?,
    )?;
    links.link = true;
    rules.fallback = Some(Box::new(links));
    Ok(rules)
}

pub fn config() -> Result<SiteConfig, ScrapeError> {
    Ok(SiteConfig {
        key: "uva",
        name: "University of Virginia",
        base_url: BASE_URL.to_string(),
        dir: "uva",
        stem: "uva_enrollment",
        render: false,
        proxy_timeout: None,
        requires_proxy: false,
        checkpoint: false,
        terms: TermSource::Generated(semesters()),
        units: UnitSource::Single,
        fallback_units: Vec::new(),
        listing: ListingUrl::Template("{base}/?Semester={term}"),
        extraction: Extraction::Tagged(section_rows()?),
        pagination: PaginationRules::single_page(),
        detail: None,
        pacing: SitePacing {
            term: DelayPolicy::Fixed(Duration::from_secs(3)),
            ..SitePacing::default()
        },
        test_limits: TestLimits {
            terms: TermSlice::Last(1),
            units: 0,
        },
    })
}
