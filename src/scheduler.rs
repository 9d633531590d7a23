// src/scheduler.rs
//! Drives sources: load cursor, poll, forward, then persist the new cursor.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::artifact::Artifact;
use crate::config::IngestConfig;
use crate::error::PollError;
use crate::sink::ArtifactSink;
use crate::source::cursor::Cursor;
use crate::source::Source;
use crate::state::CursorStore;

/// Fingerprints remembered across runs for duplicate suppression.
pub const DEFAULT_SEEN_CAP: usize = 50_000;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval_secs: u64,
    pub poll_timeout_secs: u64,
}

impl SchedulerCfg {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs.max(1))
    }
}

impl From<&IngestConfig> for SchedulerCfg {
    fn from(c: &IngestConfig) -> Self {
        Self {
            interval_secs: c.interval_secs,
            poll_timeout_secs: c.poll_timeout_secs,
        }
    }
}

/// Bounded FIFO set of artifact fingerprints already forwarded.
#[derive(Debug)]
pub struct SeenSet {
    set: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl SeenSet {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.set.contains(fingerprint)
    }

    pub fn insert(&mut self, fingerprint: String) {
        if !self.set.insert(fingerprint.clone()) {
            return;
        }
        self.order.push_back(fingerprint);
        while self.order.len() > self.cap {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
    }

    /// Artifacts not seen before and not repeated within the batch.
    /// Does not record them; call `insert` once they are delivered.
    pub fn filter_new(&self, artifacts: Vec<Artifact>) -> (Vec<Artifact>, usize) {
        let mut batch = HashSet::new();
        let mut dropped = 0usize;
        let mut keep = Vec::with_capacity(artifacts.len());
        for a in artifacts {
            let fp = a.fingerprint();
            if self.contains(&fp) || !batch.insert(fp) {
                dropped += 1;
                continue;
            }
            keep.push(a);
        }
        (keep, dropped)
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SEEN_CAP)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub source: String,
    pub produced: usize,
    pub forwarded: usize,
    pub duplicates: usize,
    pub cursor: Cursor,
}

/// One poll cycle for one source. The stored cursor only moves after the
/// sink accepted the batch; any failure leaves it untouched.
pub async fn run_source_once(
    source: &dyn Source,
    store: &dyn CursorStore,
    sink: &dyn ArtifactSink,
    cfg: &SchedulerCfg,
    seen: &mut SeenSet,
) -> Result<RunReport> {
    let name = source.name().to_string();
    let saved = store
        .load(&name)
        .with_context(|| format!("loading cursor for {name}"))?;

    let polled = match tokio::time::timeout(cfg.poll_timeout(), source.poll(saved.as_ref())).await
    {
        Ok(r) => r,
        Err(_) => Err(PollError::Transport(format!(
            "poll timed out after {}s",
            cfg.poll_timeout().as_secs()
        ))),
    };
    let outcome = polled.with_context(|| format!("polling source {name}"))?;

    let produced = outcome.artifacts.len();
    let (fresh, duplicates) = seen.filter_new(outcome.artifacts);
    if duplicates > 0 {
        counter!("ingest_dedup_total").increment(duplicates as u64);
    }

    sink.store(&name, &fresh)
        .await
        .with_context(|| format!("forwarding artifacts from {name}"))?;
    for a in &fresh {
        seen.insert(a.fingerprint());
    }

    store
        .save(&name, &outcome.cursor)
        .with_context(|| format!("saving cursor for {name}"))?;
    gauge!("ingest_last_success_ts").set(chrono::Utc::now().timestamp() as f64);

    Ok(RunReport {
        source: name,
        produced,
        forwarded: fresh.len(),
        duplicates,
        cursor: outcome.cursor,
    })
}

/// Poll every source once, sequentially. A failing source is logged and
/// reported; the others still run.
pub async fn run_all_once(
    sources: &[Box<dyn Source>],
    store: &dyn CursorStore,
    sink: &dyn ArtifactSink,
    cfg: &SchedulerCfg,
    seen: &mut SeenSet,
) -> Vec<(String, Result<RunReport>)> {
    crate::source::ensure_metrics_described();

    let mut out = Vec::with_capacity(sources.len());
    for s in sources {
        let res = run_source_once(s.as_ref(), store, sink, cfg, seen).await;
        match &res {
            Ok(r) => tracing::info!(
                target: "ingest",
                source = %r.source,
                produced = r.produced,
                forwarded = r.forwarded,
                duplicates = r.duplicates,
                cursor = %r.cursor,
                "source polled"
            ),
            Err(e) => {
                tracing::warn!(target: "ingest", source = s.name(), error = ?e, "source failed");
            }
        }
        out.push((s.name().to_string(), res));
    }
    out
}

/// Spawn the polling loop: every `interval_secs`, poll all sources once.
/// Sources run one after another, so a source never has two polls in flight.
pub fn spawn_scheduler(
    cfg: SchedulerCfg,
    sources: Vec<Box<dyn Source>>,
    store: Arc<dyn CursorStore>,
    sink: Arc<dyn ArtifactSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut seen = SeenSet::default();
        loop {
            ticker.tick().await;
            let results =
                run_all_once(&sources, store.as_ref(), sink.as_ref(), &cfg, &mut seen).await;
            let failed = results.iter().filter(|(_, r)| r.is_err()).count();
            counter!("ingest_runs_total").increment(1);
            tracing::info!(
                target: "ingest",
                sources = results.len(),
                failed = failed,
                "ingest tick"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_set_drops_repeats_and_evicts_oldest() {
        let a = Artifact::task("a", "s", "https://x/a", "");
        let b = Artifact::task("b", "s", "https://x/b", "");
        let c = Artifact::task("c", "s", "https://x/c", "");

        let mut seen = SeenSet::with_capacity(2);
        let (keep, dropped) = seen.filter_new(vec![a.clone(), a.clone(), b.clone()]);
        assert_eq!(keep, vec![a.clone(), b.clone()]);
        assert_eq!(dropped, 1);
        assert!(seen.is_empty(), "filter_new must not record");

        for x in &keep {
            seen.insert(x.fingerprint());
        }
        seen.insert(c.fingerprint());
        assert_eq!(seen.len(), 2);
        assert!(!seen.contains(&a.fingerprint()));
        assert!(seen.contains(&b.fingerprint()));
        assert!(seen.contains(&c.fingerprint()));
    }
}
