use std::future::Future;

use crate::error::AppError;
use crate::models::FeedItem;

/// Fetches a resource body over plain HTTP.
///
/// Implementations return `AppError::HttpStatus` for non-success responses
/// so callers can tell "server said no" apart from transport failures.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Follows the redirect chain of a URL and reports where it ends up.
///
/// This is the raw network operation; caching and coalescing live in
/// [`crate::redirect::RedirectResolver`].
pub trait Resolver: Send + Sync + Clone {
    fn resolve(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Renders a page in a headless browser and returns the resulting markup.
pub trait Renderer: Send + Sync + Clone {
    fn render(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Installs a finished snapshot as the current output.
///
/// Implementations must never leave a partially written snapshot visible.
pub trait SnapshotSink: Send + Sync {
    fn install(&self, items: &[FeedItem]) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A renderer for runs without headless fallback. Every render fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    async fn render(&self, _url: &str) -> Result<String, AppError> {
        Err(AppError::RenderError("headless rendering disabled".into()))
    }
}
