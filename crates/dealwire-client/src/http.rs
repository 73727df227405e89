use std::error::Error as _;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use dealwire_core::error::AppError;
use dealwire_core::redirect::MAX_REDIRECT_HOPS;
use reqwest::Client;
use reqwest::redirect::Policy;
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; dealwire/0.1; +feed-ingest)";

/// Settings shared by the reqwest-backed fetcher and resolver.
///
/// SSRF protection is **enabled** by default: requests to private, loopback,
/// link-local and CGN addresses are refused, both for the initial URL and
/// for every redirect hop whose host is an IP literal.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub user_agent: String,
    ssrf_protection: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: USER_AGENT.to_string(),
            ssrf_protection: true,
        }
    }
}

impl HttpOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disable SSRF protection, allowing requests to private/reserved IPs.
    ///
    /// Only for tests against local servers or a machine the user controls.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }

    pub fn ssrf_protection(&self) -> bool {
        self.ssrf_protection
    }

    pub(crate) fn build_client(&self) -> Result<Client, AppError> {
        Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .redirect(redirect_policy(self.ssrf_protection))
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))
    }

    /// Refuse URLs the client must not touch. No-op when protection is off.
    pub(crate) async fn check_url(&self, url: &str) -> Result<(), AppError> {
        if self.ssrf_protection {
            validate_url(url).await?;
        }
        Ok(())
    }
}

/// A redirect hop refused by the SSRF guard.
#[derive(Debug)]
struct BlockedRedirect(String);

impl fmt::Display for BlockedRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SSRF blocked: redirect to {}", self.0)
    }
}

impl std::error::Error for BlockedRedirect {}

#[derive(Debug)]
struct TooManyRedirects;

impl fmt::Display for TooManyRedirects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "more than {MAX_REDIRECT_HOPS} redirects")
    }
}

impl std::error::Error for TooManyRedirects {}

fn redirect_policy(ssrf_protection: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECT_HOPS {
            return attempt.error(TooManyRedirects);
        }
        let next = attempt.url();
        if !matches!(next.scheme(), "http" | "https") {
            let target = next.to_string();
            return attempt.error(BlockedRedirect(target));
        }
        if ssrf_protection && next.host_str().and_then(literal_ip).is_some_and(is_private_ip) {
            let target = next.to_string();
            return attempt.error(BlockedRedirect(target));
        }
        attempt.follow()
    })
}

/// Translate a reqwest failure into the matching [`AppError`].
pub(crate) fn map_request_error(e: reqwest::Error, url: &str, timeout: Duration) -> AppError {
    if e.is_timeout() {
        return AppError::Timeout(timeout.as_secs());
    }
    let mut source = e.source();
    while let Some(s) = source {
        if let Some(blocked) = s.downcast_ref::<BlockedRedirect>() {
            return AppError::HttpError(blocked.to_string());
        }
        if s.is::<TooManyRedirects>() {
            return AppError::RedirectLimit(url.to_string());
        }
        source = s.source();
    }
    if e.is_redirect() {
        AppError::RedirectLimit(url.to_string())
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::HttpError(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

fn literal_ip(host: &str) -> Option<IpAddr> {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok()
}

/// Validate a URL to prevent server-side request forgery (SSRF).
///
/// 1. Only allow `http` and `https` schemes.
/// 2. Resolve the hostname via DNS.
/// 3. Reject if any resolved IP is private/reserved.
async fn validate_url(url: &str) -> Result<(), AppError> {
    let parsed =
        Url::parse(url).map_err(|e| AppError::HttpError(format!("Invalid URL {url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::HttpError(format!(
                "URL scheme '{scheme}' is not allowed (only http/https)"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::HttpError(format!("URL {url} has no host")))?;

    if let Some(ip) = literal_ip(host) {
        if is_private_ip(ip) {
            return Err(AppError::HttpError(format!(
                "SSRF blocked: {host} is a private/reserved address"
            )));
        }
        return Ok(());
    }

    let port = parsed.port_or_known_default().unwrap_or(80);
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AppError::NetworkError(format!("DNS resolution failed for {host}: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(AppError::NetworkError(format!(
            "DNS resolution returned no addresses for {host}"
        )));
    }

    if let Some(addr) = addrs.iter().find(|a| is_private_ip(a.ip())) {
        return Err(AppError::HttpError(format!(
            "SSRF blocked: {host} resolves to private/reserved IP {}",
            addr.ip()
        )));
    }

    Ok(())
}

/// Check if an IP address is in a private/reserved/link-local range.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local() // 169.254.0.0/16, cloud metadata
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || (a == 100 && (b & 0xC0) == 64) // 100.64.0.0/10, CGN
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xFFC0) == 0xFE80 // link-local
                || (first & 0xFE00) == 0xFC00 // unique local
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}
