//! Affiliate rules and URL classification.
//!
//! [`AffiliateRuleSet::classify`] is pure: it strips tracking parameters and
//! re-tags URLs whose host matches a configured rule. Rules are scanned in
//! declared order and the first match wins, so the outcome never depends on
//! hash or iteration order.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;

/// Network name reported for links no rule matched.
pub const UNKNOWN_NETWORK: &str = "unknown";

/// Query parameters removed from every URL before tagging.
///
/// Matched case-insensitively. Any parameter starting with `utm_` is removed too.
pub const TRACKING_PARAMS: &[&str] = &[
    "tag",
    "ref",
    "ref_",
    "affid",
    "aff",
    "aff_id",
    "associatetag",
    "linkcode",
    "linkid",
    "creativeasin",
    "camp",
    "creative",
    "ascsubtag",
    "fbclid",
    "gclid",
];

const TRACKING_PREFIX: &str = "utm_";

fn default_param() -> String {
    "tag".to_string()
}

/// Maps a domain substring to an affiliate tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateRule {
    /// Substring matched against the lower-cased host.
    pub domain: String,
    /// Network reported on matching links (e.g. "amazon").
    pub network: String,
    /// Query parameter that carries the tag.
    #[serde(default = "default_param")]
    pub param: String,
    /// Tag value appended to matching links.
    pub value: String,
}

impl AffiliateRule {
    pub fn new(
        domain: impl Into<String>,
        network: impl Into<String>,
        param: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into().to_ascii_lowercase(),
            network: network.into(),
            param: param.into(),
            value: value.into(),
        }
    }

    fn matches_host(&self, host: &str) -> bool {
        !self.domain.is_empty() && host.contains(&self.domain)
    }
}

/// Outcome of classifying one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// URL with tracking parameters removed and, for affiliate links, the tag appended.
    pub cleaned: String,
    pub network: String,
    pub is_affiliate: bool,
}

impl Classification {
    /// The input unchanged, not an affiliate link.
    pub fn passthrough(url: &str) -> Self {
        Self {
            cleaned: url.to_string(),
            network: UNKNOWN_NETWORK.to_string(),
            is_affiliate: false,
        }
    }
}

/// Ordered affiliate rules, read-only for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AffiliateRuleSet {
    rules: Vec<AffiliateRule>,
}

impl AffiliateRuleSet {
    pub fn new(rules: Vec<AffiliateRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|mut r| {
                r.domain = r.domain.to_ascii_lowercase();
                r
            })
            .collect();
        Self { rules }
    }

    /// Amazon US and Canada associate tags, in that order.
    pub fn amazon(us_tag: &str, ca_tag: &str) -> Self {
        Self::new(vec![
            AffiliateRule::new("amazon.com", "amazon", "tag", us_tag),
            AffiliateRule::new("amazon.ca", "amazon", "tag", ca_tag),
        ])
    }

    /// Parse a JSON array of rules. Order in the file is match order.
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let rules: Vec<AffiliateRule> = serde_json::from_str(json)
            .map_err(|e| AppError::ConfigError(format!("Invalid affiliate rules: {e}")))?;
        Ok(Self::new(rules))
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read rules file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }

    pub fn rules(&self) -> &[AffiliateRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose domain is contained in `host`.
    pub fn match_host(&self, host: &str) -> Option<&AffiliateRule> {
        let host = host.to_ascii_lowercase();
        self.rules.iter().find(|r| r.matches_host(&host))
    }

    /// Strip tracking parameters and apply the first matching rule.
    ///
    /// Unparsable or non-http(s) URLs come back unchanged. When nothing is
    /// stripped and no rule matches, the input string is returned as-is.
    pub fn classify(&self, raw: &str) -> Classification {
        let Ok(mut url) = Url::parse(raw) else {
            return Classification::passthrough(raw);
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Classification::passthrough(raw);
        }

        let rule = url.host_str().and_then(|h| self.match_host(h));

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let mut kept: Vec<(String, String)> = pairs
            .iter()
            .filter(|(k, _)| {
                !is_tracking_param(k) && rule.is_none_or(|r| !k.eq_ignore_ascii_case(&r.param))
            })
            .cloned()
            .collect();
        let stripped = kept.len() != pairs.len();

        match rule {
            None if !stripped => Classification::passthrough(raw),
            None => {
                replace_query(&mut url, &kept);
                Classification {
                    cleaned: url.to_string(),
                    network: UNKNOWN_NETWORK.to_string(),
                    is_affiliate: false,
                }
            }
            Some(rule) => {
                kept.push((rule.param.clone(), rule.value.clone()));
                replace_query(&mut url, &kept);
                Classification {
                    cleaned: url.to_string(),
                    network: rule.network.clone(),
                    is_affiliate: true,
                }
            }
        }
    }
}

/// True for parameters on the fixed tracking list or with a `utm_` prefix.
pub fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with(TRACKING_PREFIX) || TRACKING_PARAMS.contains(&lower.as_str())
}

fn replace_query(url: &mut Url, pairs: &[(String, String)]) {
    url.set_query(None);
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
}
