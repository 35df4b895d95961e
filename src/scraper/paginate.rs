//! Pagination driver: fetch a listing page, extract, decide whether to advance.
//!
//! `Start -> FetchPage -> Extract -> HasMore? -> Advance -> FetchPage | Done`
//!
//! Any page-level failure ends this listing only; whatever was collected so
//! far is returned.

use crate::data::records::{CourseRecord, Unit};
use crate::scraper::errors::ScrapeError;
use crate::scraper::extract::{Extraction, element_text, resolve_url, selector};
use crate::scraper::fetcher::PageSource;
use crate::scraper::pacing::Pacer;
use html_scraper::{Html, Selector};
use regex::Regex;
use tracing::{debug, info, warn};

/// A "next page" control. Enabled means present, not carrying the disabled
/// class (on itself or its parent), and linking somewhere.
#[derive(Debug, Clone)]
pub struct NextControl {
    pub selector: Selector,
    /// Case-insensitive text the control must contain, e.g. `"next"`.
    pub text: Option<String>,
    pub disabled_class: Option<String>,
}

impl NextControl {
    pub fn new(css: &str, text: Option<&str>, disabled_class: Option<&str>) -> Result<Self, ScrapeError> {
        Ok(Self {
            selector: selector(css)?,
            text: text.map(str::to_lowercase),
            disabled_class: disabled_class.map(str::to_string),
        })
    }

    /// Resolved link of the first enabled control on the page.
    fn find(&self, document: &Html, page_url: &str) -> Option<String> {
        document.select(&self.selector).find_map(|el| {
            if let Some(text) = &self.text
                && !element_text(el).to_lowercase().contains(text.as_str())
            {
                return None;
            }
            if let Some(class) = &self.disabled_class {
                let parent_disabled = el
                    .parent()
                    .and_then(html_scraper::ElementRef::wrap)
                    .is_some_and(|p| p.value().has_class(class, html_scraper::CaseSensitivity::AsciiCaseInsensitive));
                let self_disabled =
                    el.value().has_class(class, html_scraper::CaseSensitivity::AsciiCaseInsensitive);
                if self_disabled || parent_disabled {
                    return None;
                }
            }
            resolve_url(page_url, el.value().attr("href")?)
        })
    }
}

/// How the URL of the following page is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Substitute `{page}` in the listing URL, counting up from `start`.
    Template { start: u32 },
    /// Follow the next control's link.
    FollowNext,
    /// The listing is a single page.
    Single,
}

#[derive(Debug, Clone)]
pub struct PaginationRules {
    /// Matches "Displaying X to Y of Z"; groups 2 and 3 are Y and Z.
    pub counter: Option<Regex>,
    pub next: Option<NextControl>,
    pub advance: Advance,
    /// Hard ceiling on pages fetched per listing.
    pub max_pages: u32,
}

/// What a page says about the pages after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSignals {
    pub has_more: bool,
    pub next_href: Option<String>,
}

impl PaginationRules {
    pub fn single_page() -> Self {
        Self {
            counter: None,
            next: None,
            advance: Advance::Single,
            max_pages: 1,
        }
    }

    /// The counter decides when present; otherwise an enabled next control does.
    /// With neither, the page is treated as the last one.
    pub fn inspect(&self, document: &Html, page_url: &str) -> PageSignals {
        let next_href = self.next.as_ref().and_then(|n| n.find(document, page_url));
        let has_more = match self.counter_position(document) {
            Some((shown, total)) => shown < total,
            None => next_href.is_some(),
        };
        PageSignals { has_more, next_href }
    }

    fn counter_position(&self, document: &Html) -> Option<(u64, u64)> {
        let counter = self.counter.as_ref()?;
        let text = element_text(document.root_element());
        let caps = counter.captures(&text)?;
        Some((caps.get(2)?.as_str().parse().ok()?, caps.get(3)?.as_str().parse().ok()?))
    }
}

/// Why a listing stopped advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The last page said there was nothing after it.
    LastPage,
    /// A page produced no records.
    Empty,
    /// `max_pages` pages were fetched.
    Ceiling,
    FetchFailed,
    ExtractFailed,
}

impl StopReason {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::FetchFailed | Self::ExtractFailed)
    }
}

/// Records collected from one listing.
#[derive(Debug)]
pub struct Listing {
    pub records: Vec<CourseRecord>,
    pub pages: u32,
    pub stop: StopReason,
}

struct PageOutcome {
    records: Vec<CourseRecord>,
    signals: PageSignals,
}

/// Walks one listing's pages.
pub struct Paginator<'a> {
    pub rules: &'a PaginationRules,
    pub extraction: &'a Extraction,
    pub pacer: &'a Pacer,
}

impl Paginator<'_> {
    /// Collect records from every page of the listing at `listing_url`.
    ///
    /// For template advancing, `listing_url` still carries its `{page}` placeholder.
    pub async fn drive(
        &self,
        source: &dyn PageSource,
        listing_url: &str,
        unit: Option<&Unit>,
    ) -> Listing {
        let mut records = Vec::new();
        let mut url = match self.rules.advance {
            Advance::Template { start } => page_url(listing_url, start),
            _ => listing_url.to_string(),
        };
        let mut pages = 0;

        let stop = loop {
            if pages >= self.rules.max_pages {
                info!(url, max_pages = self.rules.max_pages, "Reached page ceiling");
                break StopReason::Ceiling;
            }
            if pages > 0 {
                self.pacer.between_pages().await;
            }
            pages += 1;

            let Some(body) = source.fetch_page(&url, self.extraction.page_kind()).await else {
                warn!(url, page = pages, "Failed to fetch page, stopping pagination");
                break StopReason::FetchFailed;
            };

            let outcome = match self.analyze(&body, &url, unit) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(url, page = pages, error = %e, "Failed to extract page, stopping pagination");
                    break StopReason::ExtractFailed;
                }
            };

            let count = outcome.records.len();
            debug!(url, page = pages, count, has_more = outcome.signals.has_more, "Extracted page");
            if count == 0 {
                break StopReason::Empty;
            }
            records.extend(outcome.records);

            if !outcome.signals.has_more {
                break StopReason::LastPage;
            }

            url = match self.rules.advance {
                Advance::Template { start } => page_url(listing_url, start + pages),
                Advance::FollowNext => match outcome.signals.next_href {
                    Some(next) => next,
                    None => {
                        debug!(url, "More pages reported but no next link to follow");
                        break StopReason::LastPage;
                    }
                },
                Advance::Single => break StopReason::LastPage,
            };
        };

        Listing { records, pages, stop }
    }

    /// Parse once, extract and read pagination signals. Kept synchronous so the
    /// parsed document never lives across an await.
    fn analyze(&self, body: &str, url: &str, unit: Option<&Unit>) -> Result<PageOutcome, ScrapeError> {
        match self.extraction {
            Extraction::Tagged(rules) => {
                let document = Html::parse_document(body);
                Ok(PageOutcome {
                    records: rules.extract_document(&document, url),
                    signals: self.rules.inspect(&document, url),
                })
            }
            Extraction::Payload(rules) => Ok(PageOutcome {
                records: rules.extract(body, url, unit)?,
                signals: PageSignals {
                    has_more: false,
                    next_href: None,
                },
            }),
        }
    }
}

fn page_url(template: &str, page: u32) -> String {
    template.replace("{page}", &page.to_string())
}
