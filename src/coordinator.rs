//! Runs the selected sites one after another, writes each site's dataset and
//! records how every run went in `scraping_results.json`.

use crate::config::Config;
use crate::data::checkpoint::CheckpointStore;
use crate::data::output::{merge_term, write_outputs};
use crate::scraper::errors::ScrapeError;
use crate::scraper::fetcher::Fetcher;
use crate::scraper::pacing::{DelayPolicy, InstantSleeper, Pacer, TokioSleeper};
use crate::scraper::runner::SiteRunner;
use crate::sites::{SiteConfig, registry};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use num_format::{Locale, ToFormattedString};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};
use yansi::Paint;

pub const RESULTS_FILE: &str = "scraping_results.json";

/// Switches that apply to every site in a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub test_mode: bool,
    pub skip_existing: bool,
    /// Run proxy-only sites without an API key.
    pub allow_direct: bool,
    /// Replace every wait with an instant, recorded one.
    pub no_delay: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteResult {
    pub status: SiteStatus,
    pub timestamp: DateTime<Utc>,
    pub records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SiteResult {
    fn new(status: SiteStatus, records: usize, reason: Option<String>) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            records,
            reason,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub test_mode: bool,
    pub results: IndexMap<String, SiteResult>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.results.values().any(|r| r.status == SiteStatus::Failed)
    }
}

pub struct Coordinator {
    config: Config,
    options: RunOptions,
    sites: IndexMap<&'static str, SiteConfig>,
}

impl Coordinator {
    pub fn new(config: Config, options: RunOptions) -> Result<Self, ScrapeError> {
        Ok(Self {
            config,
            options,
            sites: registry()?,
        })
    }

    /// Point one site at another host, e.g. a local fixture server.
    pub fn with_base_url(mut self, key: &str, base_url: &str) -> Self {
        if let Some(site) = self.sites.get_mut(key) {
            site.base_url = base_url.to_string();
        }
        self
    }

    pub fn sites(&self) -> impl Iterator<Item = &SiteConfig> {
        self.sites.values()
    }

    pub fn print_sites(&self) {
        println!("Available universities:");
        for site in self.sites() {
            let proxy = if site.requires_proxy { " (proxy)" } else { "" };
            println!("  {:<10} {}{}", site.key.bold(), site.name, proxy.dim());
        }
    }

    /// Resolve requested keys in dispatch order; unknown keys are warned about
    /// and dropped. No keys selects every site.
    pub fn select(&self, keys: &[String]) -> Vec<&'static str> {
        if keys.is_empty() {
            return self.sites.keys().copied().collect();
        }
        for key in keys {
            if !self.sites.keys().any(|k| k.eq_ignore_ascii_case(key.trim())) {
                warn!(key = key.as_str(), "Unknown university, skipping");
            }
        }
        self.sites
            .keys()
            .copied()
            .filter(|key| keys.iter().any(|k| k.trim().eq_ignore_ascii_case(key)))
            .collect()
    }

    /// Run every selected site in order and write the run summary.
    pub async fn run(&self, keys: &[String]) -> Result<RunSummary> {
        let selected = self.select(keys);
        info!(
            sites = ?selected,
            test_mode = self.options.test_mode,
            skip_existing = self.options.skip_existing,
            "Starting scrape run"
        );

        let mut results = IndexMap::new();
        for key in selected {
            let site = &self.sites[key];
            results.insert(key.to_string(), self.run_site(site).await);
        }

        let summary = RunSummary {
            timestamp: Utc::now(),
            test_mode: self.options.test_mode,
            results,
        };
        let path = self.write_summary(&summary)?;
        info!(path = %path.display(), "Run summary saved");
        Ok(summary)
    }

    async fn run_site(&self, site: &SiteConfig) -> SiteResult {
        let paths = site.output_paths(&self.config.output_dir);
        if self.options.skip_existing && paths.exists() {
            info!(site = site.key, csv = %paths.csv.display(), "Output already exists, skipping");
            return SiteResult::new(SiteStatus::Skipped, 0, Some("output exists".to_string()));
        }

        let started = Instant::now();
        match self.scrape(site).await {
            Ok(count) => {
                info!(
                    site = site.key,
                    records = count,
                    elapsed = crate::utils::fmt_duration(started.elapsed()),
                    "Site finished"
                );
                SiteResult::new(SiteStatus::Success, count, None)
            }
            Err(e) => {
                error!(site = site.key, error = format!("{e:#}"), "Site failed");
                SiteResult::new(SiteStatus::Failed, 0, Some(format!("{e:#}")))
            }
        }
    }

    async fn scrape(&self, site: &SiteConfig) -> Result<usize> {
        let (fetcher, pacer) = self.fetcher(site)?;
        let mut runner = SiteRunner::new(site, &fetcher, pacer)
            .test_mode(self.options.test_mode)
            .with_span(info_span!("site", site = site.key));
        // Test runs see a shortened term list; their indices must never become a resume point.
        if site.checkpoint && !self.options.test_mode {
            runner = runner.with_checkpoint(CheckpointStore::in_dir(&site.output_dir(&self.config.output_dir)));
        }

        let run = runner.run().await?;
        if run.records.is_empty() {
            warn!(site = site.key, errors = run.stats.errors, "Site produced no records");
        }
        write_outputs(&site.output_paths(&self.config.output_dir), &run.records)
            .with_context(|| format!("failed to write {} output", site.key))?;
        Ok(run.records.len())
    }

    /// Re-scrape one term of one site and merge it into the existing dataset.
    /// Returns the row count of the merged dataset.
    pub async fn update(&self, key: &str, term: &str) -> Result<usize> {
        let site = self
            .sites
            .get(key.trim())
            .with_context(|| format!("unknown university {key:?}"))?;
        let (fetcher, pacer) = self.fetcher(site)?;
        let runner = SiteRunner::new(site, &fetcher, pacer)
            .test_mode(self.options.test_mode)
            .with_span(info_span!("update", site = site.key));

        let (term, run) = runner.run_term(term).await?;
        let fresh = run.records.len();
        if fresh == 0 {
            warn!(site = site.key, term = term.label.as_str(), errors = run.stats.errors, "No courses scraped");
            return Err(ScrapeError::NoRecords {
                site: site.key.to_string(),
                term: term.label,
            }
            .into());
        }
        let total = merge_term(&site.output_paths(&self.config.output_dir), &term, run.records)
            .with_context(|| format!("failed to merge {} into {} dataset", term.label, site.key))?;
        info!(site = site.key, term = term.label.as_str(), fresh, total, "Term updated");
        Ok(total)
    }

    fn pacer(&self) -> Pacer {
        if self.options.no_delay {
            Pacer::instant(Arc::new(InstantSleeper::new()))
        } else {
            Pacer::new(Arc::new(TokioSleeper), DelayPolicy::Fixed(self.config.rate_limit_delay))
        }
    }

    fn fetcher(&self, site: &SiteConfig) -> Result<(Fetcher, Pacer), ScrapeError> {
        if site.requires_proxy && self.config.scraper_api_key.is_none() {
            if !self.options.allow_direct {
                return Err(ScrapeError::MissingApiKey {
                    site: site.key.to_string(),
                });
            }
            warn!(site = site.key, "No proxy key, fetching directly; requests may be blocked");
        }

        let pacer = self.pacer();
        let fetcher = Fetcher::from_config(&self.config, pacer.clone())?
            .with_render(site.render)
            .with_proxy_timeout(site.proxy_timeout);
        debug!(site = site.key, proxy = fetcher.uses_proxy(), render = site.render, "Fetcher ready");
        Ok((fetcher, pacer))
    }

    fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)
            .with_context(|| format!("failed to create {}", self.config.output_dir.display()))?;
        let path = self.config.output_dir.join(RESULTS_FILE);
        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Print the per-site outcome table and the record total.
pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "Scraping summary".bold());
    for (key, result) in &summary.results {
        let status = match result.status {
            SiteStatus::Success => "ok".green(),
            SiteStatus::Failed => "failed".red(),
            SiteStatus::Skipped => "skipped".yellow(),
        };
        let records = result.records.to_formatted_string(&Locale::en);
        match &result.reason {
            Some(reason) => println!("  {key:<10} {status:<8} {records:>9}  {}", reason.dim()),
            None => println!("  {key:<10} {status:<8} {records:>9}"),
        }
    }

    let total: usize = summary.results.values().map(|r| r.records).sum();
    let succeeded = summary
        .results
        .values()
        .filter(|r| r.status == SiteStatus::Success)
        .count();
    println!(
        "  {} of {} sites succeeded, {} records",
        succeeded,
        summary.results.len(),
        total.to_formatted_string(&Locale::en).bold()
    );
}
