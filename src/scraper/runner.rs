//! Drives one site: terms, then units within each term, then every page of
//! each unit's listing.
//!
//! A unit that fails is logged and counted; the run moves on to the next one.
//! When checkpointing is enabled the resume point is saved after every unit
//! and removed once all terms are done.

use crate::data::checkpoint::{Checkpoint, CheckpointStore};
use crate::data::records::{CourseRecord, RunStats, TermDescriptor, Unit};
use crate::scraper::errors::ScrapeError;
use crate::scraper::extract::DetailRules;
use crate::scraper::fetcher::{PageKind, PageSource};
use crate::scraper::pacing::Pacer;
use crate::scraper::paginate::Paginator;
use crate::sites::discovery::template_vars;
use crate::sites::{ListingUrl, SiteConfig};
use crate::utils::{log_if_slow, render_template};
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{Instrument, Span, debug, error, info, warn};

const SLOW_UNIT: Duration = Duration::from_secs(600);

/// Everything one site run collected.
#[derive(Debug, Default)]
pub struct SiteRun {
    pub records: Vec<CourseRecord>,
    pub stats: RunStats,
}

pub struct SiteRunner<'a> {
    site: &'a SiteConfig,
    source: &'a dyn PageSource,
    pacer: Pacer,
    checkpoint: Option<CheckpointStore>,
    test_mode: bool,
    span: Span,
}

impl<'a> SiteRunner<'a> {
    pub fn new(site: &'a SiteConfig, source: &'a dyn PageSource, pacer: Pacer) -> Self {
        Self {
            site,
            source,
            pacer: pacer.with_site(site.pacing),
            checkpoint: None,
            test_mode: false,
            span: Span::none(),
        }
    }

    pub fn with_checkpoint(mut self, store: CheckpointStore) -> Self {
        self.checkpoint = Some(store);
        self
    }

    /// Restrict the run to the site's test slice of terms, units and detail pages.
    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    /// Span every event of this run is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Scrape every term, resuming from the stored checkpoint if there is one.
    pub async fn run(&self) -> Result<SiteRun, ScrapeError> {
        async {
            let mut terms = self
                .site
                .terms
                .discover(self.source, &self.site.base_url, self.site.key)
                .await?;
            if self.test_mode {
                terms = self.site.test_limits.terms.apply(terms);
                info!(terms = terms.len(), "Test mode, limiting terms");
            }

            let resume = self
                .checkpoint
                .as_ref()
                .and_then(CheckpointStore::load)
                .unwrap_or_default();
            let run = self.scrape_terms(&terms, resume, self.checkpoint.as_ref()).await;

            if let Some(store) = &self.checkpoint
                && let Err(e) = store.clear()
            {
                warn!(path = %store.path().display(), error = %e, "Failed to remove checkpoint");
            }
            Ok(run)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Scrape the single term matching `query` (exact code or label fragment).
    /// Checkpoints are neither read nor written.
    pub async fn run_term(&self, query: &str) -> Result<(TermDescriptor, SiteRun), ScrapeError> {
        async {
            let terms = self
                .site
                .terms
                .discover(self.source, &self.site.base_url, self.site.key)
                .await?;
            let term = terms
                .into_iter()
                .find(|t| t.matches(query))
                .ok_or_else(|| ScrapeError::UnknownTerm {
                    site: self.site.key.to_string(),
                    query: query.to_string(),
                })?;

            info!(term = term.label.as_str(), code = term.code.as_str(), "Scraping single term");
            let run = self
                .scrape_terms(std::slice::from_ref(&term), Checkpoint::default(), None)
                .await;
            Ok((term, run))
        }
        .instrument(self.span.clone())
        .await
    }

    async fn scrape_terms(
        &self,
        terms: &[TermDescriptor],
        mut state: Checkpoint,
        store: Option<&CheckpointStore>,
    ) -> SiteRun {
        let first_term = state.year_idx;
        let mut cached_units: Option<Vec<Unit>> = None;

        for (t, term) in terms.iter().enumerate().skip(first_term) {
            if t > first_term {
                self.pacer.between_terms().await;
            }
            if !term.is_unscoped() {
                info!(term = term.label.as_str(), code = term.code.as_str(), "Scraping term");
            }

            let units = match &cached_units {
                Some(units) => units.clone(),
                None => {
                    let units = self.units(term).await;
                    if !self.site.units.depends_on_term(term) {
                        cached_units = Some(units.clone());
                    }
                    units
                }
            };

            let first_unit = if t == first_term { state.dept_idx } else { 0 };
            for (u, unit) in units.iter().enumerate().skip(first_unit) {
                if u > first_unit {
                    self.pacer.between_units().await;
                }

                let started = Instant::now();
                match self.scrape_unit(term, unit).await {
                    Ok((found, detail_errors)) => {
                        info!(
                            unit = unit_label(term, unit),
                            count = found.len(),
                            detail_errors,
                            "Scraped unit"
                        );
                        state.stats.total_courses += found.len();
                        state.stats.units_processed += 1;
                        state.stats.errors += detail_errors;
                        state.records.extend(found);
                    }
                    Err(e) => {
                        error!(unit = unit_label(term, unit), error = %e, "Failed to scrape unit");
                        state.stats.errors += 1;
                    }
                }
                log_if_slow(started, SLOW_UNIT, "unit scrape");

                if let Some(store) = store {
                    state.year_idx = t;
                    state.dept_idx = u + 1;
                    if let Err(e) = store.save(&state) {
                        warn!(path = %store.path().display(), error = %e, "Failed to save checkpoint");
                    }
                }
            }
        }

        info!(
            records = state.records.len(),
            units = state.stats.units_processed,
            errors = state.stats.errors,
            "Site run complete"
        );
        SiteRun {
            records: state.records,
            stats: state.stats,
        }
    }

    async fn units(&self, term: &TermDescriptor) -> Vec<Unit> {
        let mut units = self
            .site
            .units
            .discover(self.source, &self.site.base_url, term, &self.site.fallback_units)
            .await;
        let limit = self.site.test_limits.units;
        if self.test_mode && limit > 0 && units.len() > limit {
            debug!(limit, found = units.len(), "Test mode, limiting units");
            units.truncate(limit);
        }
        units
    }

    /// Records of one unit, plus the number of detail pages that could not be fetched.
    async fn scrape_unit(
        &self,
        term: &TermDescriptor,
        unit: &Unit,
    ) -> Result<(Vec<CourseRecord>, usize), ScrapeError> {
        let listing_url = self.listing_url(term, unit)?;
        let paginator = Paginator {
            rules: &self.site.pagination,
            extraction: &self.site.extraction,
            pacer: &self.pacer,
        };
        let listing = paginator.drive(self.source, &listing_url, Some(unit)).await;
        debug!(url = listing_url, pages = listing.pages, stop = ?listing.stop, "Listing finished");
        if listing.records.is_empty() && listing.stop.is_failure() {
            return Err(ScrapeError::ListingFailed { url: listing_url });
        }

        let mut records = listing.records;
        let detail_errors = match &self.site.detail {
            Some(detail) => self.enrich(detail, &mut records).await,
            None => 0,
        };

        let scraped_at = Utc::now();
        for record in &mut records {
            if !term.is_unscoped() {
                record.term = Some(term.code.clone());
                record.term_label.get_or_insert_with(|| term.label.clone());
            }
            if !unit.code.is_empty() && record.department.is_none() {
                let name = if unit.name.is_empty() { &unit.code } else { &unit.name };
                record.department = Some(name.clone());
            }
            if record.school.is_none() {
                record.school.clone_from(&unit.school);
            }
            record.scraped_at = Some(scraped_at);
            record.summarize_enrollment();
        }
        Ok((records, detail_errors))
    }

    fn listing_url(&self, term: &TermDescriptor, unit: &Unit) -> Result<String, ScrapeError> {
        let vars = template_vars(term, Some(unit));
        let template = match (&self.site.listing, &unit.url) {
            (ListingUrl::Template(template), _) => template,
            (ListingUrl::UnitLink { .. }, Some(url)) => return Ok(url.clone()),
            (ListingUrl::UnitLink { otherwise: Some(template) }, None) => template,
            (ListingUrl::UnitLink { otherwise: None }, None) => {
                return Err(ScrapeError::MissingUnitLink {
                    unit: unit.code.clone(),
                });
            }
        };
        Ok(render_template(template, &self.site.base_url, &vars))
    }

    /// Visit each record's own page and return how many fetches failed.
    /// Test mode keeps only the first few records.
    async fn enrich(&self, detail: &DetailRules, records: &mut Vec<CourseRecord>) -> usize {
        if self.test_mode && detail.test_limit > 0 && records.len() > detail.test_limit {
            records.truncate(detail.test_limit);
        }

        let mut visited = 0;
        let mut failed = 0;
        for record in records.iter_mut() {
            let Some(url) = record.source_url.clone() else {
                continue;
            };
            if visited > 0 {
                self.pacer.between_details().await;
            }
            visited += 1;

            match self.source.fetch_page(&url, PageKind::Html).await {
                Some(body) => detail.enrich(record, &body),
                None => {
                    warn!(url, course = record.course_code.as_str(), "Failed to fetch course page");
                    failed += 1;
                }
            }
        }
        failed
    }
}

fn unit_label<'a>(term: &'a TermDescriptor, unit: &'a Unit) -> &'a str {
    match (unit.code.is_empty(), term.is_unscoped()) {
        (false, _) => unit.code.as_str(),
        (true, false) => term.label.as_str(),
        (true, true) => "all",
    }
}
