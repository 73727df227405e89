pub mod config;
pub mod content;
pub mod error;
pub mod extractor;
pub mod feed;
pub mod models;
pub mod pipeline;
pub mod redirect;
pub mod report;
pub mod retry;
pub mod rules;
pub mod snapshot;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{ConcurrencyLimits, PipelineConfig, Timeouts};
pub use content::{ContentOutcome, ContentRenderer, ContentSource, ItemDegradation};
pub use error::AppError;
pub use extractor::{ExtractedLink, extract_links};
pub use feed::{FeedFetcher, ParsedFeed, parse_feed};
pub use models::{FeedItem, FeedSource, ProcessedLink, RawFeedEntry};
pub use pipeline::Pipeline;
pub use redirect::{LinkDegradation, MAX_REDIRECT_HOPS, RedirectResolver};
pub use report::{
    PipelineEvent, PipelineReporter, RunPhase, RunReport, SourceReport, SourceStatus,
    TracingPipelineReporter,
};
pub use retry::RetryPolicy;
pub use rules::{AffiliateRule, AffiliateRuleSet, Classification};
pub use snapshot::FileSnapshotWriter;
pub use traits::{Fetcher, NullRenderer, Renderer, Resolver, SnapshotSink};
