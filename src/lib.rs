// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod artifact;
pub mod config;
pub mod error;
pub mod http;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod sources;
pub mod state;

// ---- Re-exports for stable public API ----
pub use crate::artifact::{Artifact, ArtifactKind};
pub use crate::error::{MappingError, PollError};
pub use crate::source::cursor::{Clock, Cursor, FixedClock, SystemClock};
pub use crate::source::{PollOutcome, PollingSource, Source};

use std::sync::Arc;

/// Build every configured source, sharing one clock.
pub fn build_sources(
    cfg: &config::IngestConfig,
    clock: Arc<dyn Clock>,
) -> Result<Vec<Box<dyn Source>>, PollError> {
    cfg.sources
        .iter()
        .map(|s| {
            sources::build_source(s, clock.clone()).map(|p| Box::new(p) as Box<dyn Source>)
        })
        .collect()
}
