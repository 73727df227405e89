use scraper::{Html, Selector};
use url::Url;

/// An outbound anchor target found in an entry's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub url: String,
    /// Position of the owning entry within its feed.
    pub entry: usize,
    /// Domain of the feed the entry came from.
    pub source_domain: String,
}

/// Single-pass iterator over the outbound links of one document.
///
/// Anchors are collected in document order when the markup is parsed; the
/// self-link and scheme filters run lazily as the iterator is consumed.
#[derive(Debug)]
pub struct ExtractedLinks {
    hrefs: std::vec::IntoIter<String>,
    entry: usize,
    source_domain: String,
}

impl ExtractedLinks {
    fn empty(entry: usize, source_domain: &str) -> Self {
        Self {
            hrefs: Vec::new().into_iter(),
            entry,
            source_domain: source_domain.to_string(),
        }
    }
}

impl Iterator for ExtractedLinks {
    type Item = ExtractedLink;

    fn next(&mut self) -> Option<ExtractedLink> {
        for href in self.hrefs.by_ref() {
            if is_outbound(&href, &self.source_domain) {
                return Some(ExtractedLink {
                    url: href,
                    entry: self.entry,
                    source_domain: self.source_domain.clone(),
                });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.hrefs.size_hint().1)
    }
}

/// Enumerate the absolute http(s) anchors of `content` whose host does not
/// contain `source_domain`.
///
/// Malformed markup never fails: the parser recovers what it can and a
/// document without anchors yields nothing.
pub fn extract_links(content: &str, source_domain: &str, entry: usize) -> ExtractedLinks {
    if content.trim().is_empty() {
        return ExtractedLinks::empty(entry, source_domain);
    }
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return ExtractedLinks::empty(entry, source_domain),
    };

    let document = Html::parse_document(content);
    let hrefs: Vec<String> = document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect();

    ExtractedLinks {
        hrefs: hrefs.into_iter(),
        entry,
        source_domain: source_domain.to_ascii_lowercase(),
    }
}

/// Absolute http(s) URL whose host is not part of the feed's own domain.
fn is_outbound(href: &str, source_domain: &str) -> bool {
    let Ok(url) = Url::parse(href) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host_str() {
        Some(host) => {
            source_domain.is_empty() || !host.to_ascii_lowercase().contains(source_domain)
        }
        None => false,
    }
}
