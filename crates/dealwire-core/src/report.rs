use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::FeedSource;

/// Phase of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    FetchingSources,
    ProcessingItems,
    Assembling,
    Written,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::FetchingSources => "fetching_sources",
            RunPhase::ProcessingItems => "processing_items",
            RunPhase::Assembling => "assembling",
            RunPhase::Written => "written",
            RunPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of fetching one feed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    /// Parsed only after repairing the document.
    Malformed,
    /// Well-formed, but without entries.
    Empty,
    Failed(String),
    /// The run was cancelled before the fetch finished.
    Cancelled,
}

impl SourceStatus {
    /// The fetch ran to completion, successfully or not.
    pub fn is_finished(&self) -> bool {
        !matches!(self, SourceStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub url: String,
    pub domain: String,
    #[serde(flatten)]
    pub status: SourceStatus,
    /// Entries parsed from the feed.
    pub entries: usize,
    /// Items this source contributed to the snapshot.
    pub items: usize,
    pub warnings: Vec<String>,
}

impl SourceReport {
    pub fn new(source: &FeedSource, status: SourceStatus) -> Self {
        Self {
            url: source.url.clone(),
            domain: source.domain.clone(),
            status,
            entries: 0,
            items: 0,
            warnings: Vec::new(),
        }
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceReport>,
    pub items_written: usize,
    pub links_processed: usize,
    pub affiliate_links: usize,
    /// Links that kept their original URL because resolution failed.
    pub unresolved_links: usize,
    /// Items whose page content could not be used.
    pub degraded_items: usize,
    /// The deadline or an external cancel cut the run short.
    pub cancelled: bool,
    /// Share of processed links that carry an affiliate tag, in percent.
    pub conversion_rate: f64,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            phase: RunPhase::Idle,
            started_at: Utc::now(),
            finished_at: None,
            sources: Vec::new(),
            items_written: 0,
            links_processed: 0,
            affiliate_links: 0,
            unresolved_links: 0,
            degraded_items: 0,
            cancelled: false,
            conversion_rate: 0.0,
            duration_ms: 0,
        }
    }

    pub fn failed_sources(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.status, SourceStatus::Failed(_)))
            .count()
    }

    pub(crate) fn finish(&mut self, phase: RunPhase, elapsed: Duration) {
        self.phase = phase;
        self.finished_at = Some(Utc::now());
        self.duration_ms = elapsed.as_millis() as u64;
        self.conversion_rate = if self.links_processed == 0 {
            0.0
        } else {
            self.affiliate_links as f64 * 100.0 / self.links_processed as f64
        };
    }
}

/// Events emitted by the pipeline for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    RunStarted { run_id: Uuid, sources: usize },
    PhaseChanged { run_id: Uuid, phase: RunPhase },
    SourceFinished { report: &'a SourceReport },
    Cancelled { run_id: Uuid, deadline: bool },
    RunFinished { report: &'a RunReport },
    RunFailed { run_id: Uuid, error: &'a AppError },
}

/// Trait for receiving pipeline events (decoupled logging).
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPipelineReporter;

impl PipelineReporter for TracingPipelineReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::RunStarted { run_id, sources } => {
                tracing::info!(%run_id, sources, "Run started");
            }
            PipelineEvent::PhaseChanged { run_id, phase } => {
                tracing::debug!(%run_id, %phase, "Phase changed");
            }
            PipelineEvent::SourceFinished { report } => match &report.status {
                SourceStatus::Failed(error) => {
                    tracing::warn!(source = %report.url, %error, "Source failed");
                }
                SourceStatus::Cancelled => {
                    tracing::warn!(source = %report.url, "Source fetch cancelled");
                }
                status => {
                    for warning in &report.warnings {
                        tracing::warn!(source = %report.url, %warning, "Feed warning");
                    }
                    tracing::info!(
                        source = %report.url,
                        entries = report.entries,
                        status = ?status,
                        "Source fetched"
                    );
                }
            },
            PipelineEvent::Cancelled { run_id, deadline } => {
                if deadline {
                    tracing::warn!(%run_id, "Run deadline reached, cancelling in-flight work");
                } else {
                    tracing::warn!(%run_id, "Run cancelled");
                }
            }
            PipelineEvent::RunFinished { report } => {
                tracing::info!(
                    run_id = %report.run_id,
                    items = report.items_written,
                    links = report.links_processed,
                    affiliate = report.affiliate_links,
                    unresolved = report.unresolved_links,
                    degraded_items = report.degraded_items,
                    failed_sources = report.failed_sources(),
                    conversion_rate = report.conversion_rate,
                    duration_ms = report.duration_ms,
                    "Run finished"
                );
            }
            PipelineEvent::RunFailed { run_id, error } => {
                tracing::error!(%run_id, %error, "Run failed, previous snapshot left in place");
            }
        }
    }
}
