//! The shared scraping pipeline: fetch, extract, paginate, and run a site.

pub mod errors;
pub mod extract;
pub mod fetcher;
pub mod json;
pub mod pacing;
pub mod paginate;
pub mod runner;
pub mod terms;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::ScrapeError;
pub use fetcher::{Fetcher, PageKind, PageSource};
pub use pacing::{DelayPolicy, InstantSleeper, Pacer, SitePacing, Sleeper, TokioSleeper};
pub use runner::{SiteRun, SiteRunner};
