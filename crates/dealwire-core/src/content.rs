use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::error::AppError;
use crate::retry::{RetryPolicy, with_retry};
use crate::traits::{Fetcher, Renderer};

/// Bodies shorter than this (after trimming) are treated as client-rendered shells.
pub const MIN_STATIC_BODY_LEN: usize = 500;

/// Markers of a page that builds its content in the browser.
pub const CLIENT_RENDER_INDICATORS: &[&str] = &[
    "data-reactroot",
    "data-react-",
    "ng-app",
    "vue-app",
    "<div id=\"root\"></div>",
    "<div id=\"app\"></div>",
    "loading...",
    "please enable javascript",
];

/// Where the returned body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Static,
    Rendered,
    Empty,
}

/// Why an item page produced no usable body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ItemDegradation {
    /// Static fetch failed and no render was attempted.
    FetchFailed(String),
    /// Static body was not HTML and no render was attempted.
    NotHtml,
    /// A render was attempted and failed.
    RenderFailed(String),
    /// The run was cancelled before the page was fetched.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentOutcome {
    pub body: String,
    pub source: ContentSource,
    pub degradation: Option<ItemDegradation>,
}

impl ContentOutcome {
    fn with_body(body: String, source: ContentSource) -> Self {
        Self {
            body,
            source,
            degradation: None,
        }
    }

    pub fn empty(reason: ItemDegradation) -> Self {
        Self {
            body: String::new(),
            source: ContentSource::Empty,
            degradation: Some(reason),
        }
    }
}

/// True when the body carries an opening `<html` or `<body` tag.
pub fn looks_like_html(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("<html") || lower.contains("<body")
}

/// True when static HTML is likely an empty shell filled in by JavaScript.
pub fn is_client_rendered(body: &str) -> bool {
    if body.trim().len() < MIN_STATIC_BODY_LEN {
        return true;
    }
    let lower = body.to_ascii_lowercase();
    CLIENT_RENDER_INDICATORS.iter().any(|marker| lower.contains(marker))
}

/// Fetches item pages, escalating to a headless render when the static
/// response is unusable.
#[derive(Clone)]
pub struct ContentRenderer<F: Fetcher, R: Renderer> {
    fetcher: F,
    renderer: R,
    render_fallback: bool,
    retry: RetryPolicy,
    page_timeout: Duration,
    render_timeout: Duration,
    render_slots: Arc<Semaphore>,
}

impl<F: Fetcher, R: Renderer> ContentRenderer<F, R> {
    pub fn new(fetcher: F, renderer: R, retry: RetryPolicy) -> Self {
        Self {
            fetcher,
            renderer,
            render_fallback: false,
            retry,
            page_timeout: Duration::from_secs(15),
            render_timeout: Duration::from_secs(30),
            render_slots: Arc::new(Semaphore::new(2)),
        }
    }

    pub fn with_render_fallback(mut self, enabled: bool) -> Self {
        self.render_fallback = enabled;
        self
    }

    pub fn with_timeouts(mut self, page: Duration, render: Duration) -> Self {
        self.page_timeout = page;
        self.render_timeout = render;
        self
    }

    /// Limit concurrent renders. At least one slot is always kept.
    pub fn with_render_limit(mut self, limit: usize) -> Self {
        self.render_slots = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    pub async fn fetch_content(&self, url: &str) -> ContentOutcome {
        let timeout = self.page_timeout;
        let fetched = with_retry(&self.retry, url, || async move {
            match tokio::time::timeout(timeout, self.fetcher.fetch(url)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(timeout.as_secs())),
            }
        })
        .await;

        let reason = match fetched {
            Ok(body) if looks_like_html(&body) => {
                if !self.render_fallback || !is_client_rendered(&body) {
                    return ContentOutcome::with_body(body, ContentSource::Static);
                }
                tracing::debug!(%url, "Page looks client-rendered, trying headless render");
                return match self.render(url).await {
                    Ok(html) => ContentOutcome::with_body(html, ContentSource::Rendered),
                    Err(e) => {
                        tracing::debug!(%url, error = %e, "Render failed, keeping static body");
                        ContentOutcome::with_body(body, ContentSource::Static)
                    }
                };
            }
            Ok(_) => ItemDegradation::NotHtml,
            Err(e) => ItemDegradation::FetchFailed(e.to_string()),
        };

        if !self.render_fallback {
            tracing::debug!(%url, ?reason, "Static fetch insufficient, render fallback disabled");
            return ContentOutcome::empty(reason);
        }

        match self.render(url).await {
            Ok(html) => ContentOutcome::with_body(html, ContentSource::Rendered),
            Err(e) => {
                tracing::warn!(%url, error = %e, "Headless render failed");
                ContentOutcome::empty(ItemDegradation::RenderFailed(e.to_string()))
            }
        }
    }

    async fn render(&self, url: &str) -> Result<String, AppError> {
        let _permit = self
            .render_slots
            .acquire()
            .await
            .map_err(|_| AppError::Cancelled)?;
        match tokio::time::timeout(self.render_timeout, self.renderer.render(url)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.render_timeout.as_secs())),
        }
    }
}
