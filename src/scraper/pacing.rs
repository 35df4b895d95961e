//! Request pacing: delay policies and the injectable sleeper that applies them.

use crate::utils::fmt_duration;
use async_trait::async_trait;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// How long to wait before the next request of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPolicy {
    None,
    Fixed(Duration),
    /// Uniformly random between the bounds, inclusive.
    Uniform { min: Duration, max: Duration },
    /// `base * 2^attempt`, capped at `max`.
    Backoff { base: Duration, max: Duration },
}

impl DelayPolicy {
    pub fn uniform_secs(min: u64, max: u64) -> Self {
        Self::Uniform {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }

    /// Delay before the request following `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => d,
            Self::Uniform { min, max } => {
                let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
                let lo_ms = lo.as_millis() as u64;
                let hi_ms = hi.as_millis() as u64;
                Duration::from_millis(rand::rng().random_range(lo_ms..=hi_ms))
            }
            Self::Backoff { base, max } => {
                let factor = 2u32.saturating_pow(attempt);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Something that can wait. Production uses tokio's timer; tests record instead.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested delay.
///
/// Used for `--no-delay` runs against local fixtures and by tests asserting
/// on pacing.
#[derive(Debug, Default)]
pub struct InstantSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Per-site pacing between listing pages, units, detail pages and terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SitePacing {
    pub page: DelayPolicy,
    pub unit: DelayPolicy,
    pub detail: DelayPolicy,
    pub term: DelayPolicy,
}

impl Default for SitePacing {
    fn default() -> Self {
        Self {
            page: DelayPolicy::None,
            unit: DelayPolicy::None,
            detail: DelayPolicy::None,
            term: DelayPolicy::None,
        }
    }
}

/// Applies delay policies through a [`Sleeper`].
#[derive(Clone)]
pub struct Pacer {
    sleeper: Arc<dyn Sleeper>,
    site: SitePacing,
    rate_limit: DelayPolicy,
    retry: DelayPolicy,
}

impl Pacer {
    pub fn new(sleeper: Arc<dyn Sleeper>, rate_limit: DelayPolicy) -> Self {
        Self {
            sleeper,
            site: SitePacing::default(),
            rate_limit,
            retry: DelayPolicy::Backoff {
                base: Duration::from_secs(1),
                max: Duration::from_secs(60),
            },
        }
    }

    /// No waiting at all; every delay is still recorded by the sleeper.
    pub fn instant(sleeper: Arc<InstantSleeper>) -> Self {
        let mut pacer = Self::new(sleeper, DelayPolicy::None);
        pacer.retry = DelayPolicy::None;
        pacer
    }

    pub fn with_site(mut self, site: SitePacing) -> Self {
        self.site = site;
        self
    }

    pub async fn between_pages(&self) {
        self.wait(self.site.page, 0, "page").await;
    }

    pub async fn between_units(&self) {
        self.wait(self.site.unit, 0, "unit").await;
    }

    pub async fn between_details(&self) {
        self.wait(self.site.detail, 0, "detail").await;
    }

    pub async fn between_terms(&self) {
        self.wait(self.site.term, 0, "term").await;
    }

    /// After an HTTP 429, before retrying.
    pub async fn after_rate_limit(&self, attempt: u32) {
        self.wait(self.rate_limit, attempt, "rate limited").await;
    }

    /// After a transport failure on a retrying request.
    pub async fn before_retry(&self, attempt: u32) {
        self.wait(self.retry, attempt, "retry").await;
    }

    async fn wait(&self, policy: DelayPolicy, attempt: u32, reason: &'static str) {
        if policy == DelayPolicy::None {
            return;
        }
        let delay = policy.delay(attempt);
        debug!(delay = fmt_duration(delay), reason, "Waiting");
        self.sleeper.sleep(delay).await;
    }
}
