use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;

use crate::error::AppError;
use crate::traits::Resolver;

/// Maximum number of redirects followed for one link.
pub const MAX_REDIRECT_HOPS: usize = 10;

/// Why a link kept its original URL instead of a resolved one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LinkDegradation {
    Timeout,
    RedirectLimit,
    Cancelled,
    Unreachable(String),
}

impl From<&AppError> for LinkDegradation {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::Timeout(_) => LinkDegradation::Timeout,
            AppError::RedirectLimit(_) => LinkDegradation::RedirectLimit,
            AppError::Cancelled | AppError::DeadlineExceeded => LinkDegradation::Cancelled,
            other => LinkDegradation::Unreachable(other.to_string()),
        }
    }
}

/// Result of resolving one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Where the redirect chain ended, or the original URL on failure.
    pub url: String,
    pub degradation: Option<LinkDegradation>,
}

/// Run-scoped redirect resolution with caching and in-flight coalescing.
///
/// Every outcome is cached for the lifetime of this value, degraded ones
/// included, so each distinct URL costs at most one network round-trip per
/// run. Concurrent callers for the same URL share that round-trip. A
/// cancelled resolution is not an answer and is left out of the cache.
///
/// Build one per run. The cache is unbounded so no entry is evicted while
/// the run is still going.
#[derive(Clone)]
pub struct RedirectResolver<R: Resolver> {
    resolver: R,
    cache: Cache<String, Resolution>,
    timeout: Duration,
}

impl<R: Resolver + 'static> RedirectResolver<R> {
    pub fn new(resolver: R, timeout: Duration) -> Self {
        Self {
            resolver,
            cache: Cache::builder().build(),
            timeout,
        }
    }

    /// Resolve `url`, degrading to the original URL on any failure.
    pub async fn resolve(&self, url: &str) -> Resolution {
        let resolver = self.resolver.clone();
        let timeout = self.timeout;
        let target = url.to_string();

        let result = self
            .cache
            .try_get_with(url.to_string(), async move {
                let outcome = match tokio::time::timeout(timeout, resolver.resolve(&target)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Timeout(timeout.as_secs())),
                };
                match outcome {
                    Ok(resolved) => Ok(Resolution {
                        url: resolved,
                        degradation: None,
                    }),
                    Err(e @ (AppError::Cancelled | AppError::DeadlineExceeded)) => Err(e),
                    Err(e) => {
                        tracing::debug!(
                            url = %target,
                            error = %e,
                            "Redirect resolution failed, keeping original"
                        );
                        Ok(Resolution {
                            degradation: Some(LinkDegradation::from(&e)),
                            url: target,
                        })
                    }
                }
            })
            .await;

        result.unwrap_or_else(|e| Resolution {
            url: url.to_string(),
            degradation: Some(LinkDegradation::from(e.as_ref())),
        })
    }

    #[cfg(test)]
    async fn cached(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}
