//! ioc-ingestor — Binary Entrypoint
//! Loads config, builds the polling sources and runs them on an interval
//! (or once, with `INGEST_ONCE=1`), writing artifacts as JSON lines.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ioc_ingestor::config::IngestConfig;
use ioc_ingestor::scheduler::{self, SchedulerCfg, SeenSet};
use ioc_ingestor::sink::{ArtifactSink, JsonLinesSink};
use ioc_ingestor::state::{CursorStore, FileCursorStore};
use ioc_ingestor::SystemClock;

/// Logs go to stderr so stdout stays clean JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ioc_ingestor=info,ingest=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = IngestConfig::load_default().context("loading ingest config")?;
    let sources = ioc_ingestor::build_sources(&cfg, Arc::new(SystemClock))?;
    let store: Arc<dyn CursorStore> = Arc::new(FileCursorStore::new(cfg.state_path.clone()));
    let sink: Arc<dyn ArtifactSink> = match &cfg.output_path {
        Some(p) => Arc::new(JsonLinesSink::file(p.clone())),
        None => Arc::new(JsonLinesSink::stdout()),
    };
    let sched = SchedulerCfg::from(&cfg);

    tracing::info!(
        sources = sources.len(),
        interval_secs = sched.interval_secs,
        state = %cfg.state_path.display(),
        "ioc-ingestor starting"
    );

    let once = std::env::var("INGEST_ONCE").ok().is_some_and(|v| v == "1");
    if once {
        let mut seen = SeenSet::default();
        let results =
            scheduler::run_all_once(&sources, store.as_ref(), sink.as_ref(), &sched, &mut seen)
                .await;
        let failed: Vec<&str> = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(name, _)| name.as_str())
            .collect();
        if !failed.is_empty() {
            anyhow::bail!("sources failed: {}", failed.join(", "));
        }
        return Ok(());
    }

    let handle = scheduler::spawn_scheduler(sched, sources, store, sink);
    tokio::select! {
        res = handle => {
            res.context("scheduler task ended")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received, shutting down");
        }
    }
    Ok(())
}
