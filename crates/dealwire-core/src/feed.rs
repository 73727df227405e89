//! Feed fetching and permissive parsing.
//!
//! Feeds in the wild are frequently broken: stray bytes before the XML
//! declaration, unescaped ampersands, control characters, or a document cut
//! off mid-item. A strict parse is tried first; if it fails, a small set of
//! repairs is applied and the repaired document is accepted when it yields at
//! least one entry. Such feeds are flagged as malformed in the warnings.

use std::borrow::Cow;

use feed_rs::model::{Entry, Feed};
use url::Url;

use crate::error::AppError;
use crate::models::{FeedSource, RawFeedEntry};
use crate::retry::{RetryPolicy, with_retry};
use crate::traits::Fetcher;

/// Entries parsed from one feed plus any non-fatal problems seen on the way.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub entries: Vec<RawFeedEntry>,
    pub warnings: Vec<String>,
    /// The document only parsed after repair.
    pub malformed: bool,
}

/// Parse an RSS, Atom, or JSON Feed document.
///
/// Returns `AppError::FeedParseError` when neither the document nor any
/// repaired form of it parses into at least one entry.
pub fn parse_feed(body: &str) -> Result<ParsedFeed, AppError> {
    let strict_err = match feed_rs::parser::parse(body.as_bytes()) {
        Ok(feed) => return Ok(convert(feed, false, None)),
        Err(e) => e.to_string(),
    };

    let sanitized = sanitize(body);
    let candidates = [
        Some(sanitized.clone()),
        close_truncated(&sanitized).map(Cow::Owned),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Ok(feed) = feed_rs::parser::parse(candidate.as_bytes()) {
            if !feed.entries.is_empty() {
                return Ok(convert(feed, true, Some(&strict_err)));
            }
        }
    }

    Err(AppError::FeedParseError(strict_err))
}

fn convert(feed: Feed, malformed: bool, parse_error: Option<&str>) -> ParsedFeed {
    let mut warnings = Vec::new();
    if let Some(err) = parse_error {
        warnings.push(format!("Malformed feed recovered after repair: {err}"));
    }

    let mut entries = Vec::with_capacity(feed.entries.len());
    for (position, entry) in feed.entries.into_iter().enumerate() {
        match convert_entry(position, entry) {
            Ok(raw) => entries.push(raw),
            Err(reason) => warnings.push(reason),
        }
    }

    if entries.is_empty() {
        warnings.push("Feed contains no usable entries".to_string());
    }

    ParsedFeed {
        entries,
        warnings,
        malformed,
    }
}

fn convert_entry(position: usize, entry: Entry) -> Result<RawFeedEntry, String> {
    let title = entry.title.map(|t| t.content).unwrap_or_default();

    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
        .or_else(|| permalink_id(&entry.id))
        .ok_or_else(|| format!("Entry {position} ('{}') has no link, skipped", title.trim()))?;

    let content = entry
        .content
        .and_then(|c| c.body)
        .filter(|body| !body.trim().is_empty())
        .or_else(|| entry.summary.map(|s| s.content))
        .unwrap_or_default();

    Ok(RawFeedEntry {
        position,
        title,
        link,
        published: entry.published.or(entry.updated),
        content,
    })
}

/// RSS `<guid isPermaLink>` values often double as the item link.
fn permalink_id(id: &str) -> Option<String> {
    let url = Url::parse(id.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| id.trim().to_string())
}

/// Drop bytes before the first tag, strip characters XML forbids, and
/// escape ampersands that do not start an entity.
fn sanitize(body: &str) -> Cow<'_, str> {
    let trimmed = match body.find('<') {
        Some(start) => &body[start..],
        None => body,
    };

    let mut out = String::with_capacity(trimmed.len());
    let mut changed = trimmed.len() != body.len();
    let mut rest = trimmed;

    while let Some(c) = rest.chars().next() {
        let len = c.len_utf8();
        if is_forbidden_xml_char(c) {
            changed = true;
        } else if c == '&' && !starts_entity(&rest[len..]) {
            out.push_str("&amp;");
            changed = true;
        } else {
            out.push(c);
        }
        rest = &rest[len..];
    }

    if changed { Cow::Owned(out) } else { Cow::Borrowed(body) }
}

fn is_forbidden_xml_char(c: char) -> bool {
    matches!(
        c,
        '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}'
    )
}

/// `rest` begins right after an `&`. True for `name;`, `#123;`, `#x1F;`.
fn starts_entity(rest: &str) -> bool {
    let Some(end) = rest.find(';') else {
        return false;
    };
    let name = &rest[..end];
    if name.is_empty() || name.len() > 32 {
        return false;
    }
    if let Some(num) = name.strip_prefix('#') {
        return match num.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()),
        };
    }
    name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Cut a truncated document after its last complete item and close it.
fn close_truncated(body: &str) -> Option<String> {
    if let Some(end) = body.rfind("</entry>") {
        let mut out = body[..end + "</entry>".len()].to_string();
        out.push_str("</feed>");
        return Some(out);
    }
    let end = body.rfind("</item>")?;
    let mut out = body[..end + "</item>".len()].to_string();
    if body.contains("<rdf:RDF") {
        out.push_str("</rdf:RDF>");
    } else {
        out.push_str("</channel></rss>");
    }
    Some(out)
}

/// Fetches and parses one feed source.
#[derive(Clone)]
pub struct FeedFetcher<F: Fetcher> {
    fetcher: F,
    retry: RetryPolicy,
}

impl<F: Fetcher> FeedFetcher<F> {
    pub fn new(fetcher: F, retry: RetryPolicy) -> Self {
        Self { fetcher, retry }
    }

    /// Fetch the feed body (retrying transient failures) and parse it.
    pub async fn fetch_feed(&self, source: &FeedSource) -> Result<ParsedFeed, AppError> {
        let body = with_retry(&self.retry, &source.url, || self.fetcher.fetch(&source.url)).await?;
        tracing::debug!(source = %source.url, bytes = body.len(), "Fetched feed");

        let parsed = parse_feed(&body)?;
        if parsed.malformed {
            tracing::warn!(source = %source.url, "Feed is malformed, processed after repair");
        }
        for warning in &parsed.warnings {
            tracing::debug!(source = %source.url, %warning, "Feed warning");
        }
        Ok(parsed)
    }
}
