use dealwire_core::error::AppError;
use dealwire_core::traits::Resolver;
use reqwest::{Client, Method, StatusCode};

use crate::http::{HttpOptions, map_request_error};

/// Follows redirect chains with reqwest.
///
/// Sends a HEAD request and reports the URL the chain ends on. Servers that
/// reject HEAD (405/501) get a GET instead; the body is never read. Any
/// final status counts as resolved, since the destination is what matters.
#[derive(Clone)]
pub struct ReqwestResolver {
    client: Client,
    options: HttpOptions,
}

impl ReqwestResolver {
    pub fn new(options: HttpOptions) -> Result<Self, AppError> {
        Ok(Self {
            client: options.build_client()?,
            options,
        })
    }

    async fn follow(&self, method: Method, url: &str) -> Result<(StatusCode, String), AppError> {
        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(|e| map_request_error(e, url, self.options.timeout))?;
        Ok((response.status(), response.url().to_string()))
    }
}

impl Resolver for ReqwestResolver {
    async fn resolve(&self, url: &str) -> Result<String, AppError> {
        self.options.check_url(url).await?;

        let (status, resolved) = self.follow(Method::HEAD, url).await?;
        if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED {
            tracing::debug!(%url, %status, "HEAD rejected, retrying with GET");
            let (_, resolved) = self.follow(Method::GET, url).await?;
            return Ok(resolved);
        }
        Ok(resolved)
    }
}
