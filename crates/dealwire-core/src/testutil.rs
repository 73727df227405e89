//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::models::FeedItem;
use crate::traits::{Fetcher, Renderer, Resolver, SnapshotSink};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher with per-URL responses and an optional per-URL delay.
#[derive(Clone, Default)]
pub struct MockFetcher {
    /// Queue of responses for URLs without a route. Each call pops the first element.
    fallback: Arc<Mutex<Vec<Result<String, AppError>>>>,
    routes: Arc<Mutex<HashMap<String, Result<String, AppError>>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(body: &str) -> Self {
        Self {
            fallback: Arc::new(Mutex::new(vec![Ok(body.to_string())])),
            ..Self::default()
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            fallback: Arc::new(Mutex::new(vec![Err(error)])),
            ..Self::default()
        }
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            fallback: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Always answer `url` with `body`.
    pub fn route(self, url: &str, body: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.to_string()));
        self
    }

    /// Always answer `url` with `error`.
    pub fn route_error(self, url: &str, error: AppError) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
        self
    }

    /// Sleep before answering `url`.
    pub fn delay(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(route) = self.routes.lock().unwrap().get(url) {
            return route.clone();
        }
        let mut fallback = self.fallback.lock().unwrap();
        if fallback.is_empty() {
            Err(AppError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
        } else {
            fallback.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockResolver
// ---------------------------------------------------------------------------

/// Mock resolver mapping URLs to redirect targets. Unmapped URLs resolve to themselves.
#[derive(Clone, Default)]
pub struct MockResolver {
    targets: Arc<Mutex<HashMap<String, Result<String, AppError>>>>,
    delay: Option<Duration>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirect(self, from: &str, to: &str) -> Self {
        self.targets
            .lock()
            .unwrap()
            .insert(from.to_string(), Ok(to.to_string()));
        self
    }

    pub fn fail(self, url: &str, error: AppError) -> Self {
        self.targets
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Resolver for MockResolver {
    async fn resolve(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let target = self.targets.lock().unwrap().get(url).cloned();
        target.unwrap_or_else(|| Ok(url.to_string()))
    }
}

// ---------------------------------------------------------------------------
// MockRenderer
// ---------------------------------------------------------------------------

/// Mock headless renderer returning a fixed result.
#[derive(Clone)]
pub struct MockRenderer {
    result: Arc<Mutex<Result<String, AppError>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockRenderer {
    pub fn new(html: &str) -> Self {
        Self {
            result: Arc::new(Mutex::new(Ok(html.to_string()))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            result: Arc::new(Mutex::new(Err(error))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Renderer for MockRenderer {
    async fn render(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.result.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Snapshot sink that keeps installed snapshots in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub installed: Arc<Mutex<Vec<Vec<FeedItem>>>>,
    error: Arc<Mutex<Option<AppError>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose next install fails.
    pub fn with_error(error: AppError) -> Self {
        Self {
            installed: Arc::new(Mutex::new(Vec::new())),
            error: Arc::new(Mutex::new(Some(error))),
        }
    }

    pub fn last(&self) -> Option<Vec<FeedItem>> {
        self.installed.lock().unwrap().last().cloned()
    }
}

impl SnapshotSink for MemorySink {
    async fn install(&self, items: &[FeedItem]) -> Result<(), AppError> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        self.installed.lock().unwrap().push(items.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Minimal RSS 2.0 document with one item per `(title, link, description)`.
pub fn rss_feed(items: &[(&str, &str, &str)]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Test</title><link>https://feed.test/</link><description>Test feed</description>"#,
    );
    for (title, link, description) in items {
        body.push_str(&format!(
            "<item><title>{title}</title><link>{link}</link><description><![CDATA[{description}]]></description></item>"
        ));
    }
    body.push_str("</channel></rss>");
    body
}
