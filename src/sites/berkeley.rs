//! BerkeleyTime's JSON API: the catalog lists courses, and each course has
//! one enrollment aggregate per semester.

use super::discovery::{TermSource, UnitSource};
use super::{ListingUrl, SiteConfig, TermSlice, TestLimits};
use crate::data::records::{Field, TermDescriptor};
use crate::scraper::errors::ScrapeError;
use crate::scraper::extract::{Extraction, PayloadRules};
use crate::scraper::pacing::{DelayPolicy, SitePacing};
use crate::scraper::paginate::PaginationRules;
use std::time::Duration;

pub const BASE_URL: &str = "https://www.berkeleytime.com";

const YEARS: [i32; 5] = [2024, 2023, 2022, 2021, 2020];
const SEMESTERS: [(&str, &str); 2] = [("fall", "Fall"), ("spring", "Spring")];

/// `2024-fall` style codes, newest year first.
fn semesters() -> Vec<TermDescriptor> {
    YEARS
        .iter()
        .flat_map(|year| {
            SEMESTERS.iter().map(move |(semester, name)| {
                TermDescriptor::new(format!("{year}-{semester}"), format!("{name} {year}"))
                    .with_param("semester", *semester)
                    .with_param("year", year.to_string())
            })
        })
        .collect()
}

pub fn config() -> Result<SiteConfig, ScrapeError> {
    Ok(SiteConfig {
        key: "berkeley",
        name: "UC Berkeley",
        base_url: BASE_URL.to_string(),
        dir: "uc_berkeley",
        stem: "berkeley_enrollment",
        render: false,
        proxy_timeout: None,
        requires_proxy: false,
        checkpoint: false,
        terms: TermSource::Generated(semesters()),
        units: UnitSource::JsonCatalog {
            page: "{base}/api/catalog/catalog_json/",
            id_keys: &["id", "course_id"],
            name_keys: &["abbreviation", "course_number"],
        },
        fallback_units: Vec::new(),
        listing: ListingUrl::Template("{base}/api/enrollment/aggregate/{unit}/{semester}/{year}/"),
        extraction: Extraction::Payload(PayloadRules {
            records_key: None,
            code_keys: vec![
                vec!["abbreviation", "course_number"],
                vec!["course_code"],
                vec!["abbreviation"],
            ],
            fields: vec![
                ("title", Field::Title),
                ("enrolled_max", Field::Capacity),
                ("waitlisted", Field::Waitlist),
            ],
        }),
        pagination: PaginationRules::single_page(),
        detail: None,
        pacing: SitePacing {
            unit: DelayPolicy::Fixed(Duration::from_millis(500)),
            ..SitePacing::default()
        },
        test_limits: TestLimits {
            terms: TermSlice::First(1),
            units: 10,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records::Unit;
    use crate::sites::discovery::template_vars;
    use crate::utils::render_template;

    #[test]
    fn test_semesters_newest_first() {
        let terms = semesters();
        assert_eq!(terms.len(), 10);
        assert_eq!(terms[0].code, "2024-fall");
        assert_eq!(terms[0].label, "Fall 2024");
        assert_eq!(terms[1].code, "2024-spring");
        assert_eq!(terms[9].code, "2020-spring");
    }

    #[test]
    fn test_aggregate_url() {
        let site = config().unwrap();
        let ListingUrl::Template(template) = site.listing else {
            panic!("expected a template");
        };
        let term = &semesters()[0];
        let unit = Unit::new("2321", "COMPSCI 61A");
        let url = render_template(template, &site.base_url, &template_vars(term, Some(&unit)));
        assert_eq!(url, "https://www.berkeleytime.com/api/enrollment/aggregate/2321/fall/2024/");
    }

    #[test]
    fn test_abbreviation_alone_is_a_code() {
        let site = config().unwrap();
        let records = site
            .extraction
            .extract(r#"{"abbreviation": "UGBA", "enrolled": 30}"#, "https://www.berkeleytime.com/x", None)
            .unwrap();
        assert_eq!(records[0].course_code, "UGBA");
        assert_eq!(records[0].enrolled, Some(30));
    }

    #[test]
    fn test_catalog_is_shared_across_terms() {
        let units = config().unwrap().units;
        assert!(semesters().iter().all(|term| !units.depends_on_term(term)));
    }
}
