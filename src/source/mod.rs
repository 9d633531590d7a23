// src/source/mod.rs
//! Generic paginated polling source with a watermark cursor.
//!
//! One poll cycle: resolve the saved cursor (or a lookback default),
//! build the query, capture the next cursor, walk every page, map each
//! raw result into artifacts. Any failure aborts the cycle with no
//! partial output and no cursor.

pub mod cursor;
pub mod pagination;
pub mod query;

use async_trait::async_trait;
use chrono::Duration;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::sync::Arc;

use crate::artifact::Artifact;
use crate::error::{MappingError, PollError};
use cursor::{Clock, Cursor};
use pagination::{fetch_all, PageFetcher, DEFAULT_MAX_PAGES};
use query::Query;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_polls_total", "Poll cycles started.");
        describe_counter!("ingest_poll_errors_total", "Poll cycles that failed.");
        describe_counter!("ingest_pages_total", "Result pages fetched.");
        describe_counter!("ingest_artifacts_total", "Artifacts produced by polls.");
        describe_counter!(
            "ingest_dedup_total",
            "Artifacts dropped as already forwarded."
        );
        describe_counter!("ingest_runs_total", "Scheduler ticks completed.");
        describe_histogram!("ingest_poll_ms", "Poll cycle duration in milliseconds.");
        describe_gauge!(
            "ingest_last_success_ts",
            "Unix ts of the last successful poll."
        );
    });
}

/// One item of a search response. Lives only for the duration of a poll.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult(Value);

impl RawResult {
    pub fn new(v: Value) -> Self {
        Self(v)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// String field, or `MappingError` if absent or not a string.
    pub fn required_str(&self, field: &'static str) -> Result<&str, MappingError> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| MappingError::missing(field))
    }
}

/// What a poll hands back to the scheduler. Returned only on success.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub cursor: Cursor,
    pub artifacts: Vec<Artifact>,
}

/// The source-specific half of a polling source: how the cursor goes
/// into the query and how results become artifacts.
pub trait SourceKind: Send + Sync {
    fn kind_name(&self) -> &'static str;

    fn build_query(&self, search: &str, cursor: &Cursor) -> Query;

    /// Pure, no I/O. May return zero, one or many artifacts.
    fn map_result(&self, raw: &RawResult, source_name: &str)
        -> Result<Vec<Artifact>, MappingError>;
}

#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    /// Runs one poll cycle. On error the caller keeps its saved cursor.
    async fn poll(&self, saved: Option<&Cursor>) -> Result<PollOutcome, PollError>;
}

pub struct PollingSource {
    name: String,
    search: String,
    lookback: Duration,
    max_pages: usize,
    kind: Box<dyn SourceKind>,
    fetcher: Box<dyn PageFetcher>,
    clock: Arc<dyn Clock>,
}

impl PollingSource {
    pub fn new(
        name: impl Into<String>,
        search: impl Into<String>,
        kind: Box<dyn SourceKind>,
        fetcher: Box<dyn PageFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            search: search.into(),
            lookback: Duration::days(cursor::DEFAULT_LOOKBACK_DAYS),
            max_pages: DEFAULT_MAX_PAGES,
            kind,
            fetcher,
            clock,
        }
    }

    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    fn map_all(&self, raw: &[RawResult]) -> Result<Vec<Artifact>, PollError> {
        let mut out = Vec::with_capacity(raw.len());
        for (index, r) in raw.iter().enumerate() {
            let mut artifacts = self
                .kind
                .map_result(r, &self.name)
                .map_err(|source| PollError::Mapping { index, source })?;
            out.append(&mut artifacts);
        }
        Ok(out)
    }
}

#[async_trait]
impl Source for PollingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&self, saved: Option<&Cursor>) -> Result<PollOutcome, PollError> {
        ensure_metrics_described();
        counter!("ingest_polls_total").increment(1);
        let t0 = std::time::Instant::now();

        let from = cursor::resolve(saved, self.clock.as_ref(), self.lookback);
        let query = self.kind.build_query(&self.search, &from);
        let next = cursor::advance(self.clock.as_ref());
        tracing::debug!(
            source = %self.name,
            kind = self.kind.kind_name(),
            from = %from,
            "poll started"
        );

        let result = match fetch_all(self.fetcher.as_ref(), &query, self.max_pages).await {
            Ok(raw) => self.map_all(&raw),
            Err(e) => Err(e),
        };
        histogram!("ingest_poll_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        match result {
            Ok(artifacts) => {
                counter!("ingest_artifacts_total").increment(artifacts.len() as u64);
                tracing::debug!(
                    source = %self.name,
                    artifacts = artifacts.len(),
                    cursor = %next,
                    "poll finished"
                );
                Ok(PollOutcome {
                    cursor: next,
                    artifacts,
                })
            }
            Err(e) => {
                counter!("ingest_poll_errors_total").increment(1);
                Err(e)
            }
        }
    }
}
