// src/source/query.rs
use serde::Serialize;

/// Parameters of the first request of a poll cycle. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    /// Full search expression, cursor bound already embedded.
    pub q: String,
    pub per_page: u32,
}

impl Query {
    pub fn new(q: impl Into<String>, per_page: u32) -> Self {
        Self {
            q: q.into(),
            per_page,
        }
    }

    /// Query-string pairs, in the order they are sent.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![("q", self.q.clone()), ("per_page", self.per_page.to_string())]
    }
}
