use dealwire_core::error::AppError;
use dealwire_core::traits::Fetcher;
use reqwest::Client;
use reqwest::header::ACCEPT;

use crate::http::{HttpOptions, map_request_error};

const ACCEPT_FEEDS_AND_PAGES: &str = "application/rss+xml, application/atom+xml, application/feed+json, \
     application/xml;q=0.9, text/xml;q=0.9, text/html;q=0.8, */*;q=0.5";

/// HTTP fetcher using reqwest.
///
/// Downloads feed documents and item pages. Non-success statuses come back
/// as [`AppError::HttpStatus`] so retry logic can tell a 503 from a 404.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    options: HttpOptions,
}

impl ReqwestFetcher {
    pub fn new(options: HttpOptions) -> Result<Self, AppError> {
        Ok(Self {
            client: options.build_client()?,
            options,
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.options.check_url(url).await?;

        let response = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_FEEDS_AND_PAGES)
            .send()
            .await
            .map_err(|e| map_request_error(e, url, self.options.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| {
                AppError::HttpError(format!("Failed to read response body from {url}: {e}"))
            })
    }
}
