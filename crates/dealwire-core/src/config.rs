use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;
use crate::models::FeedSource;
use crate::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use crate::rules::AffiliateRuleSet;

/// Allowed range for the total number of attempts per network fetch.
pub const MAX_RETRIES_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Upper bounds on in-flight work at each fan-out boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimits {
    /// Feed sources fetched at once.
    pub sources: usize,
    /// Items processed at once across all sources.
    pub items: usize,
    /// Links resolved at once across the whole run.
    pub links: usize,
    /// Headless renders at once. Kept the tightest.
    pub renders: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            sources: 4,
            items: 8,
            links: 16,
            renders: 2,
        }
    }
}

/// Per-operation network timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub feed: Duration,
    pub page: Duration,
    pub resolve: Duration,
    pub render: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            feed: Duration::from_secs(20),
            page: Duration::from_secs(15),
            resolve: Duration::from_secs(10),
            render: Duration::from_secs(30),
        }
    }
}

/// Everything one run needs. Built at the edge, immutable once the run starts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Feed sources in output order.
    pub sources: Vec<FeedSource>,
    pub rules: AffiliateRuleSet,
    /// Fall back to a headless render when a static page fetch is insufficient.
    pub render_fallback: bool,
    /// Fetch each item's own page and extract its links too.
    pub fetch_item_pages: bool,
    /// Total attempts per feed or page fetch, including the first.
    pub max_retries: u32,
    pub output_path: PathBuf,
    pub limits: ConcurrencyLimits,
    pub timeouts: Timeouts,
    /// Overall run deadline. `None` runs until all work finishes.
    pub deadline: Option<Duration>,
}

impl PipelineConfig {
    pub fn new(
        sources: Vec<FeedSource>,
        rules: AffiliateRuleSet,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sources,
            rules,
            render_fallback: false,
            fetch_item_pages: true,
            max_retries: DEFAULT_MAX_ATTEMPTS,
            output_path: output_path.into(),
            limits: ConcurrencyLimits::default(),
            timeouts: Timeouts::default(),
            deadline: Some(Duration::from_secs(300)),
        }
    }

    /// Parse feed URLs into sources, keeping their order.
    pub fn sources_from_urls<S: AsRef<str>>(urls: &[S]) -> Result<Vec<FeedSource>, AppError> {
        urls.iter()
            .map(|u| u.as_ref().trim())
            .filter(|u| !u.is_empty())
            .map(FeedSource::new)
            .collect()
    }

    pub fn with_render_fallback(mut self, enabled: bool) -> Self {
        self.render_fallback = enabled;
        self
    }

    pub fn with_fetch_item_pages(mut self, enabled: bool) -> Self {
        self.fetch_item_pages = enabled;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_limits(mut self, limits: ConcurrencyLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }

    /// Reject configurations a run cannot honor.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.sources.is_empty() {
            return Err(AppError::ConfigError(
                "No feed sources configured. Set RSS_SOURCES or pass --source.".into(),
            ));
        }
        if !MAX_RETRIES_RANGE.contains(&self.max_retries) {
            return Err(AppError::ConfigError(format!(
                "max_retries must be between {} and {}, got {}",
                MAX_RETRIES_RANGE.start(),
                MAX_RETRIES_RANGE.end(),
                self.max_retries
            )));
        }
        let limits = [
            ("sources", self.limits.sources),
            ("items", self.limits.items),
            ("links", self.limits.links),
            ("renders", self.limits.renders),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, v)| *v == 0) {
            return Err(AppError::ConfigError(format!(
                "Concurrency limit '{name}' must be at least 1"
            )));
        }
        let timeouts = [
            ("feed", self.timeouts.feed),
            ("page", self.timeouts.page),
            ("resolve", self.timeouts.resolve),
            ("render", self.timeouts.render),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, v)| v.is_zero()) {
            return Err(AppError::ConfigError(format!("Timeout '{name}' must be non-zero")));
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(AppError::ConfigError("Run deadline must be non-zero".into()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(AppError::ConfigError("Output path is empty".into()));
        }
        Ok(())
    }
}
