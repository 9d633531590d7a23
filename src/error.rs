// src/error.rs
use thiserror::Error;

/// A raw result is missing a field the source kind needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing or non-string field `{field}`")]
pub struct MappingError {
    pub field: &'static str,
}

impl MappingError {
    pub fn missing(field: &'static str) -> Self {
        Self { field }
    }
}

/// Failure of a whole poll cycle. Never accompanied by partial results.
#[derive(Debug, Error)]
pub enum PollError {
    /// Network error, non-2xx status, malformed body or timeout on any page.
    #[error("transport error: {0}")]
    Transport(String),

    /// The `index`-th raw result (0-based, across all pages) was malformed.
    #[error("result #{index} is malformed: {source}")]
    Mapping {
        index: usize,
        #[source]
        source: MappingError,
    },

    #[error("invalid source configuration: {0}")]
    Config(String),
}

impl PollError {
    pub fn transport(page: usize, reason: impl std::fmt::Display) -> Self {
        PollError::Transport(format!("page {page}: {reason}"))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, PollError::Transport(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, PollError::Mapping { .. })
    }
}
