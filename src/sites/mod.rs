//! Per-site configuration for the shared scraping pipeline.
//!
//! Every university is a [`SiteConfig`]: where its terms and units are
//! listed, how a listing URL is built, which extraction strategy applies, and
//! how politely to pace requests.

pub mod berkeley;
pub mod discovery;
pub mod princeton;
pub mod stanford;
pub mod ucla;
pub mod ucsd;
pub mod uva;
pub mod wisconsin;

use crate::data::output::OutputPaths;
use crate::data::records::{TermDescriptor, Unit};
use crate::scraper::errors::ScrapeError;
use crate::scraper::extract::{DetailRules, Extraction};
use crate::scraper::pacing::SitePacing;
use crate::scraper::paginate::PaginationRules;
use discovery::{TermSource, UnitSource};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the first listing URL of a unit is produced.
#[derive(Debug, Clone)]
pub enum ListingUrl {
    /// Rendered with `{base}`, `{term}`, `{unit}` and term params; `{page}` is
    /// left for the pagination driver.
    Template(&'static str),
    /// The link the unit was discovered through; `otherwise` is rendered for
    /// units known without one.
    UnitLink { otherwise: Option<&'static str> },
}

/// Which terms a test-mode run keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSlice {
    All,
    First(usize),
    Last(usize),
}

impl TermSlice {
    pub fn apply(self, mut terms: Vec<TermDescriptor>) -> Vec<TermDescriptor> {
        match self {
            Self::All => terms,
            Self::First(n) => {
                terms.truncate(n);
                terms
            }
            Self::Last(n) => {
                let skip = terms.len().saturating_sub(n);
                terms.split_off(skip)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestLimits {
    pub terms: TermSlice,
    /// Units per term; zero keeps all.
    pub units: usize,
}

impl Default for TestLimits {
    fn default() -> Self {
        Self {
            terms: TermSlice::All,
            units: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Coordinator key, e.g. `princeton`.
    pub key: &'static str,
    pub name: &'static str,
    pub base_url: String,
    /// Output directory under the configured output root.
    pub dir: &'static str,
    /// Output file stem, e.g. `madison_enrollment`.
    pub stem: &'static str,
    /// Ask the proxy to render JavaScript.
    pub render: bool,
    pub proxy_timeout: Option<Duration>,
    /// Refuse to run without a proxy key unless direct access is allowed.
    pub requires_proxy: bool,
    /// Persist a resume point after every unit.
    pub checkpoint: bool,
    pub terms: TermSource,
    pub units: UnitSource,
    /// Used when the unit list cannot be discovered.
    pub fallback_units: Vec<Unit>,
    pub listing: ListingUrl,
    pub extraction: Extraction,
    pub pagination: PaginationRules,
    pub detail: Option<DetailRules>,
    pub pacing: SitePacing,
    pub test_limits: TestLimits,
}

impl SiteConfig {
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(self.dir)
    }

    pub fn output_paths(&self, root: &Path) -> OutputPaths {
        OutputPaths::new(&self.output_dir(root), self.stem)
    }
}

/// Build `Unit`s from `(code, name)` pairs.
pub(crate) fn units(pairs: &[(&str, &str)]) -> Vec<Unit> {
    pairs.iter().map(|(code, name)| Unit::new(*code, *name)).collect()
}

/// Every supported site, in dispatch order.
pub fn registry() -> Result<IndexMap<&'static str, SiteConfig>, ScrapeError> {
    let sites = [
        stanford::config()?,
        princeton::config()?,
        berkeley::config()?,
        ucla::config()?,
        uva::config()?,
        wisconsin::config()?,
        ucsd::config()?,
    ];
    Ok(sites.into_iter().map(|site| (site.key, site)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_and_stems() {
        let sites = registry().unwrap();
        let keys: Vec<_> = sites.keys().copied().collect();
        assert_eq!(
            keys,
            vec!["stanford", "princeton", "berkeley", "ucla", "uva", "wisconsin", "ucsd"]
        );
        assert_eq!(sites["wisconsin"].stem, "madison_enrollment");
        assert_eq!(sites["berkeley"].dir, "uc_berkeley");
    }

    #[test]
    fn test_output_paths() {
        let sites = registry().unwrap();
        let paths = sites["ucsd"].output_paths(Path::new("data"));
        assert_eq!(paths.csv, PathBuf::from("data/uc_san_diego/ucsd_enrollment.csv"));
        assert_eq!(paths.json, PathBuf::from("data/uc_san_diego/ucsd_enrollment.json"));
    }

    #[test]
    fn test_term_slice() {
        let terms: Vec<_> = ["a", "b", "c"].iter().map(|c| TermDescriptor::new(*c, *c)).collect();
        assert_eq!(TermSlice::Last(1).apply(terms.clone())[0].code, "c");
        assert_eq!(TermSlice::First(2).apply(terms.clone()).len(), 2);
        assert_eq!(TermSlice::Last(5).apply(terms.clone()).len(), 3);
        assert_eq!(TermSlice::All.apply(terms).len(), 3);
    }
}
