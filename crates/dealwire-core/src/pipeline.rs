//! Run orchestration.
//!
//! A run walks `Idle → FetchingSources → ProcessingItems → Assembling →
//! Written | Failed`. Work inside each phase completes in any order; every
//! result carries its position so assembly is deterministic.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::content::{ContentOutcome, ContentRenderer, ItemDegradation};
use crate::error::AppError;
use crate::extractor::extract_links;
use crate::feed::{FeedFetcher, ParsedFeed};
use crate::models::{FeedItem, FeedSource, ProcessedLink, RawFeedEntry};
use crate::redirect::{LinkDegradation, RedirectResolver, Resolution};
use crate::report::{
    PipelineEvent, PipelineReporter, RunPhase, RunReport, SourceReport, SourceStatus,
    TracingPipelineReporter,
};
use crate::traits::{Fetcher, Renderer, Resolver, SnapshotSink};

/// State shared by all work of a single run. Dropped when the run ends.
struct RunContext<F: Fetcher, X: Resolver, R: Renderer> {
    cancel: CancellationToken,
    feeds: FeedFetcher<F>,
    content: ContentRenderer<F, R>,
    redirects: RedirectResolver<X>,
    link_slots: Arc<Semaphore>,
}

struct FetchedSource {
    index: usize,
    report: SourceReport,
    entries: Vec<RawFeedEntry>,
}

struct ProcessedItem {
    source: usize,
    position: usize,
    item: FeedItem,
    degradation: Option<ItemDegradation>,
    unresolved: usize,
}

/// Ingests the configured feeds and installs one snapshot per run.
pub struct Pipeline<F, X, R, S>
where
    F: Fetcher,
    X: Resolver,
    R: Renderer,
    S: SnapshotSink,
{
    config: PipelineConfig,
    fetcher: F,
    resolver: X,
    renderer: R,
    sink: S,
}

impl<F, X, R, S> Pipeline<F, X, R, S>
where
    F: Fetcher,
    X: Resolver + 'static,
    R: Renderer,
    S: SnapshotSink,
{
    /// Validates `config` up front so a run never starts with settings it cannot honor.
    pub fn new(
        config: PipelineConfig,
        fetcher: F,
        resolver: X,
        renderer: R,
        sink: S,
    ) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher,
            resolver,
            renderer,
            sink,
        })
    }

    /// Run once with tracing output and no external cancellation.
    pub async fn run_once(&self) -> Result<RunReport, AppError> {
        self.run_with_cancel(CancellationToken::new(), &TracingPipelineReporter)
            .await
    }

    /// Run once. Cancelling `cancel` behaves like the run deadline firing.
    pub async fn run_with_cancel<PR: PipelineReporter>(
        &self,
        cancel: CancellationToken,
        reporter: &PR,
    ) -> Result<RunReport, AppError> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let mut report = RunReport::new(run_id);
        reporter.report(PipelineEvent::RunStarted {
            run_id,
            sources: self.config.sources.len(),
        });

        let run_token = cancel.child_token();
        // Stops the deadline timer however this function exits.
        let _run_guard = run_token.clone().drop_guard();
        if let Some(deadline) = self.config.deadline {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(deadline) => token.cancel(),
                    () = token.cancelled() => {}
                }
            });
        }

        let ctx = self.context(run_token.clone());

        // FetchingSources
        self.enter(&mut report, RunPhase::FetchingSources, reporter);
        let mut fetched: Vec<FetchedSource> = stream::iter(self.config.sources.iter().enumerate())
            .map(|(index, source)| self.fetch_source(index, source, &ctx))
            .buffer_unordered(self.config.limits.sources)
            .collect()
            .await;
        fetched.sort_by_key(|f| f.index);
        for f in &fetched {
            reporter.report(PipelineEvent::SourceFinished { report: &f.report });
        }

        if run_token.is_cancelled() {
            report.cancelled = true;
            reporter.report(PipelineEvent::Cancelled {
                run_id,
                deadline: !cancel.is_cancelled(),
            });
            if !fetched.iter().any(|f| f.report.status.is_finished()) {
                let error = if cancel.is_cancelled() {
                    AppError::Cancelled
                } else {
                    AppError::DeadlineExceeded
                };
                return Err(self.fail(&mut report, started, error, reporter));
            }
        }

        // ProcessingItems
        self.enter(&mut report, RunPhase::ProcessingItems, reporter);
        let work: Vec<(usize, &FeedSource, RawFeedEntry)> = fetched
            .iter_mut()
            .flat_map(|f| {
                let source = &self.config.sources[f.index];
                let index = f.index;
                std::mem::take(&mut f.entries)
                    .into_iter()
                    .map(move |entry| (index, source, entry))
            })
            .collect();
        let mut processed: Vec<ProcessedItem> = stream::iter(work)
            .map(|(index, source, entry)| self.process_item(index, source, entry, &ctx))
            .buffer_unordered(self.config.limits.items)
            .collect()
            .await;

        if run_token.is_cancelled() && !report.cancelled {
            report.cancelled = true;
            reporter.report(PipelineEvent::Cancelled {
                run_id,
                deadline: !cancel.is_cancelled(),
            });
        }

        // Assembling
        self.enter(&mut report, RunPhase::Assembling, reporter);
        processed.sort_by_key(|p| (p.source, p.position));
        let mut sources: Vec<SourceReport> = fetched.into_iter().map(|f| f.report).collect();
        let mut items = Vec::with_capacity(processed.len());
        for p in processed {
            sources[p.source].items += 1;
            report.links_processed += p.item.processed_links.len();
            report.affiliate_links += p.item.affiliate_links().count();
            report.unresolved_links += p.unresolved;
            if p.degradation.is_some() {
                report.degraded_items += 1;
            }
            items.push(p.item);
        }
        report.sources = sources;
        report.items_written = items.len();

        if let Err(e) = self.sink.install(&items).await {
            return Err(self.fail(&mut report, started, e, reporter));
        }

        report.finish(RunPhase::Written, started.elapsed());
        reporter.report(PipelineEvent::RunFinished { report: &report });
        Ok(report)
    }

    fn context(&self, cancel: CancellationToken) -> RunContext<F, X, R> {
        let retry = self.config.retry_policy();
        let timeouts = self.config.timeouts;
        RunContext {
            cancel,
            feeds: FeedFetcher::new(self.fetcher.clone(), retry.clone()),
            content: ContentRenderer::new(self.fetcher.clone(), self.renderer.clone(), retry)
                .with_render_fallback(self.config.render_fallback)
                .with_timeouts(timeouts.page, timeouts.render)
                .with_render_limit(self.config.limits.renders),
            redirects: RedirectResolver::new(self.resolver.clone(), timeouts.resolve),
            link_slots: Arc::new(Semaphore::new(self.config.limits.links)),
        }
    }

    fn enter<PR: PipelineReporter>(&self, report: &mut RunReport, phase: RunPhase, reporter: &PR) {
        report.phase = phase;
        reporter.report(PipelineEvent::PhaseChanged {
            run_id: report.run_id,
            phase,
        });
    }

    fn fail<PR: PipelineReporter>(
        &self,
        report: &mut RunReport,
        started: Instant,
        error: AppError,
        reporter: &PR,
    ) -> AppError {
        report.finish(RunPhase::Failed, started.elapsed());
        reporter.report(PipelineEvent::RunFailed {
            run_id: report.run_id,
            error: &error,
        });
        error
    }

    async fn fetch_source(
        &self,
        index: usize,
        source: &FeedSource,
        ctx: &RunContext<F, X, R>,
    ) -> FetchedSource {
        let timeout = self.config.timeouts.feed;
        let result = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => Err(AppError::Cancelled),
            r = tokio::time::timeout(timeout, ctx.feeds.fetch_feed(source)) => {
                r.unwrap_or(Err(AppError::Timeout(timeout.as_secs())))
            }
        };

        match result {
            Ok(ParsedFeed {
                entries,
                warnings,
                malformed,
            }) => {
                let status = if malformed {
                    SourceStatus::Malformed
                } else if entries.is_empty() {
                    SourceStatus::Empty
                } else {
                    SourceStatus::Ok
                };
                let mut report = SourceReport::new(source, status);
                report.entries = entries.len();
                report.warnings = warnings;
                FetchedSource {
                    index,
                    report,
                    entries,
                }
            }
            Err(AppError::Cancelled) => FetchedSource {
                index,
                report: SourceReport::new(source, SourceStatus::Cancelled),
                entries: Vec::new(),
            },
            Err(e) => FetchedSource {
                index,
                report: SourceReport::new(source, SourceStatus::Failed(e.to_string())),
                entries: Vec::new(),
            },
        }
    }

    async fn process_item(
        &self,
        index: usize,
        source: &FeedSource,
        entry: RawFeedEntry,
        ctx: &RunContext<F, X, R>,
    ) -> ProcessedItem {
        let mut urls: Vec<String> = extract_links(&entry.content, &source.domain, entry.position)
            .map(|l| l.url)
            .collect();

        let mut degradation = None;
        if self.config.fetch_item_pages && !entry.link.is_empty() {
            let outcome = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => ContentOutcome::empty(ItemDegradation::Cancelled),
                o = ctx.content.fetch_content(&entry.link) => o,
            };
            if let Some(reason) = &outcome.degradation {
                tracing::debug!(item = %entry.link, ?reason, "Item page unusable");
            }
            degradation = outcome.degradation;
            let page_links = extract_links(&outcome.body, &source.domain, entry.position);
            urls.extend(page_links.map(|l| l.url));
        }

        let mut seen = HashSet::new();
        urls.retain(|u| seen.insert(u.clone()));

        let resolved = join_all(urls.into_iter().map(|url| self.process_link(url, ctx))).await;
        let unresolved = resolved.iter().filter(|(_, d)| d.is_some()).count();
        let links: Vec<ProcessedLink> = resolved.into_iter().map(|(link, _)| link).collect();

        ProcessedItem {
            source: index,
            position: entry.position,
            item: FeedItem::new(&entry, links),
            degradation,
            unresolved,
        }
    }

    async fn process_link(
        &self,
        original: String,
        ctx: &RunContext<F, X, R>,
    ) -> (ProcessedLink, Option<LinkDegradation>) {
        let cancelled = || Resolution {
            url: original.clone(),
            degradation: Some(LinkDegradation::Cancelled),
        };

        let resolution = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => cancelled(),
            permit = ctx.link_slots.acquire() => match permit {
                Ok(_permit) => tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => cancelled(),
                    r = ctx.redirects.resolve(&original) => r,
                },
                Err(_) => cancelled(),
            },
        };

        let classification = self.config.rules.classify(&resolution.url);
        let degradation = resolution.degradation;
        (
            ProcessedLink::new(original, resolution.url, classification),
            degradation,
        )
    }
}
