// src/sources/mod.rs
//! Concrete source kinds and construction from config.

pub mod github;

use chrono::Duration;
use std::sync::Arc;

use crate::config::{SourceConfig, MAX_LOOKBACK_DAYS};
use crate::error::PollError;
use crate::http::HttpPageFetcher;
use crate::source::cursor::Clock;
use crate::source::PollingSource;

/// Build a polling source for one `[[sources]]` entry.
pub fn build_source(cfg: &SourceConfig, clock: Arc<dyn Clock>) -> Result<PollingSource, PollError> {
    let name = cfg.name.trim();
    if name.is_empty() {
        return Err(PollError::Config("source name is empty".to_string()));
    }
    let lookback = Duration::try_days(cfg.lookback_days)
        .filter(|_| (1..=MAX_LOOKBACK_DAYS).contains(&cfg.lookback_days))
        .ok_or_else(|| {
            PollError::Config(format!(
                "source {name:?}: lookback_days must be within 1..={MAX_LOOKBACK_DAYS}"
            ))
        })?;

    if cfg.request_timeout_secs == 0 || cfg.max_pages == 0 {
        return Err(PollError::Config(format!(
            "source {name:?}: request_timeout_secs and max_pages must be > 0"
        )));
    }

    match cfg.module.trim().to_ascii_lowercase().as_str() {
        "github" => {
            let url = cfg.search_url.as_deref().unwrap_or(github::SEARCH_URL);
            let fetcher = HttpPageFetcher::new(url, cfg.credentials())?
                .with_timeout(cfg.request_timeout_secs);
            tracing::debug!(
                source = name,
                module = "github",
                auth = fetcher.has_credentials(),
                max_pages = cfg.max_pages,
                "source built"
            );
            Ok(PollingSource::new(
                name,
                cfg.search.clone(),
                Box::new(github::GithubRepositories),
                Box::new(fetcher),
                clock,
            )
            .with_lookback(lookback)
            .with_max_pages(cfg.max_pages))
        }
        other => Err(PollError::Config(format!(
            "source {name:?}: unknown module {other:?}"
        ))),
    }
}
