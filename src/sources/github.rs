// src/sources/github.rs
//! GitHub repository search: every newly created repository matching the
//! configured search becomes a manual review task.

use crate::artifact::Artifact;
use crate::error::MappingError;
use crate::source::cursor::Cursor;
use crate::source::query::Query;
use crate::source::{RawResult, SourceKind};

pub const SEARCH_URL: &str = "https://api.github.com/search/repositories";
pub const PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct GithubRepositories;

impl SourceKind for GithubRepositories {
    fn kind_name(&self) -> &'static str {
        "github"
    }

    fn build_query(&self, search: &str, cursor: &Cursor) -> Query {
        let search = search.trim();
        let q = if search.is_empty() {
            format!("created:>={cursor}")
        } else {
            format!("{search} created:>={cursor}")
        };
        Query::new(q, PER_PAGE)
    }

    fn map_result(
        &self,
        raw: &RawResult,
        source_name: &str,
    ) -> Result<Vec<Artifact>, MappingError> {
        let full_name = raw.required_str("full_name")?;
        let html_url = raw.required_str("html_url")?;

        let title = format!("Manual Task: GitHub {full_name}");
        let description =
            format!("URL: {html_url}\nTask autogenerated by iocingestor from source: {source_name}");
        Ok(vec![Artifact::task(
            title,
            source_name,
            html_url,
            description,
        )])
    }
}
