use chrono::{DateTime, Utc};
use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;
use crate::rules::{Classification, UNKNOWN_NETWORK};

const MAX_TITLE_CHARS: usize = 200;
const MAX_SUMMARY_CHARS: usize = 500;
const UNTITLED: &str = "Untitled";

/// A configured feed URL plus the domain used to spot self-links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    /// Lower-cased host with any leading `www.` removed.
    pub domain: String,
}

impl FeedSource {
    pub fn new(url: &str) -> Result<Self, AppError> {
        let url = url.trim();
        let parsed = Url::parse(url)
            .map_err(|e| AppError::ConfigError(format!("Invalid feed URL '{url}': {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AppError::ConfigError(format!("Feed URL '{url}' has no host")))?;
        let host = host.to_ascii_lowercase();
        let domain = host.strip_prefix("www.").unwrap_or(&host).to_string();

        Ok(Self {
            url: url.to_string(),
            domain,
        })
    }
}

/// One parsed feed entry before link processing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeedEntry {
    /// Position of the entry within its feed.
    pub position: usize,
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    /// Content body, usually HTML. Empty when the feed carried none.
    pub content: String,
}

/// A rewritten outbound link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedLink {
    pub original: String,
    pub resolved: String,
    #[serde(rename = "final")]
    pub final_url: String,
    pub is_affiliate: bool,
    pub network: String,
}

impl ProcessedLink {
    /// Build a link from its resolution and the classification of `resolved`.
    ///
    /// Non-affiliate links keep `final == resolved`; only a matched rule may
    /// touch the query string.
    pub fn new(original: String, resolved: String, classification: Classification) -> Self {
        if classification.is_affiliate {
            Self {
                original,
                resolved,
                final_url: classification.cleaned,
                is_affiliate: true,
                network: classification.network,
            }
        } else {
            Self {
                original,
                final_url: resolved.clone(),
                resolved,
                is_affiliate: false,
                network: UNKNOWN_NETWORK.to_string(),
            }
        }
    }
}

/// A fully processed feed item as written to the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub summary: String,
    pub processed_links: Vec<ProcessedLink>,
}

impl FeedItem {
    pub fn new(entry: &RawFeedEntry, processed_links: Vec<ProcessedLink>) -> Self {
        Self {
            title: normalize_title(&entry.title),
            link: entry.link.clone(),
            published: entry.published,
            summary: normalize_summary(&entry.content),
            processed_links,
        }
    }

    pub fn affiliate_links(&self) -> impl Iterator<Item = &ProcessedLink> {
        self.processed_links.iter().filter(|l| l.is_affiliate)
    }
}

/// Decode entities, collapse whitespace, and cap a title at 200 characters.
pub fn normalize_title(raw: &str) -> String {
    let text = collapse_whitespace(&html_to_text(raw));
    if text.is_empty() {
        return UNTITLED.to_string();
    }
    truncate_chars(&text, MAX_TITLE_CHARS)
}

/// Render an HTML content body to a plain-text summary of at most 500 characters.
pub fn normalize_summary(raw: &str) -> String {
    let text = collapse_whitespace(&html_to_text(raw));
    truncate_chars(&text, MAX_SUMMARY_CHARS)
}

fn html_to_text(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(raw);
    fragment.root_element().text().collect::<Vec<_>>().join(" ")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max - 3).collect();
    out.push_str("...");
    out
}
