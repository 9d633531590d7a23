// src/source/pagination.rs
//! Follow-the-next-link pagination over a search endpoint.

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

use super::query::Query;
use super::RawResult;
use crate::error::PollError;

/// Upper bound on pages per poll. A server that keeps handing out
/// `next` links past this is treated as broken.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Self-contained continuation URL taken from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink(String);

impl PageLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PageRequest<'a> {
    First(&'a Query),
    /// Follow-up: the link only, no extra parameters.
    Next(&'a PageLink),
}

/// One decoded response.
#[derive(Debug, Clone)]
pub struct Page {
    pub body: Value,
    pub next: Option<PageLink>,
}

/// Performs a single page request. Any error (network, status, body
/// decoding) fails the whole poll.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: PageRequest<'_>) -> Result<Page>;
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for std::sync::Arc<T> {
    async fn fetch(&self, request: PageRequest<'_>) -> Result<Page> {
        (**self).fetch(request).await
    }
}

enum State {
    Start,
    Next(PageLink),
    Done,
}

/// Single-traversal page stream. Yields each page's items in response
/// order; after the last page or the first error it yields `None` forever.
pub struct Pages<'a> {
    fetcher: &'a dyn PageFetcher,
    query: &'a Query,
    state: State,
    fetched: usize,
    max_pages: usize,
}

impl<'a> Pages<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, query: &'a Query, max_pages: usize) -> Self {
        Self {
            fetcher,
            query,
            state: State::Start,
            fetched: 0,
            max_pages,
        }
    }

    /// Pages fetched so far.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    pub async fn next_page(&mut self) -> Option<Result<Vec<RawResult>, PollError>> {
        let state = std::mem::replace(&mut self.state, State::Done);
        let request = match &state {
            State::Start => PageRequest::First(self.query),
            State::Next(link) => PageRequest::Next(link),
            State::Done => return None,
        };

        let page_no = self.fetched + 1;
        if self.fetched >= self.max_pages {
            return Some(Err(PollError::transport(
                page_no,
                format!("exceeded page limit of {}", self.max_pages),
            )));
        }
        self.fetched = page_no;

        let page = match self.fetcher.fetch(request).await {
            Ok(p) => p,
            Err(e) => return Some(Err(PollError::transport(page_no, format!("{e:#}")))),
        };
        counter!("ingest_pages_total").increment(1);

        let items = match extract_items(page.body) {
            Ok(items) => items,
            Err(reason) => return Some(Err(PollError::transport(page_no, reason))),
        };
        tracing::debug!(
            page = page_no,
            items = items.len(),
            has_next = page.next.is_some(),
            "page fetched"
        );

        if let Some(next) = page.next {
            self.state = State::Next(next);
        }
        Some(Ok(items))
    }
}

/// Walks every page and concatenates items in page order.
/// Fails without partial output if any page fails.
pub async fn fetch_all(
    fetcher: &dyn PageFetcher,
    query: &Query,
    max_pages: usize,
) -> Result<Vec<RawResult>, PollError> {
    let mut pages = Pages::new(fetcher, query, max_pages);
    let mut out = Vec::new();
    while let Some(page) = pages.next_page().await {
        out.append(&mut page?);
    }
    Ok(out)
}

/// `items` array of a response body. Missing or null means zero results.
fn extract_items(body: Value) -> std::result::Result<Vec<RawResult>, String> {
    match body {
        Value::Object(mut map) => match map.remove("items") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.into_iter().map(RawResult::new).collect()),
            Some(_) => Err("malformed body: `items` is not an array".to_string()),
        },
        _ => Err("malformed body: expected a JSON object".to_string()),
    }
}

/// Extracts the `rel="next"` target from an RFC 8288 `Link` header value.
pub fn parse_next_link(header: &str) -> Option<PageLink> {
    static RE_LINK: OnceCell<Regex> = OnceCell::new();
    static RE_REL: OnceCell<Regex> = OnceCell::new();
    let re_link = RE_LINK.get_or_init(|| Regex::new(r"<([^>]*)>([^<]*)").unwrap());
    let re_rel = RE_REL
        .get_or_init(|| Regex::new(r#"(?i)\brel\s*=\s*(?:"([^"]*)"|([^\s;,]+))"#).unwrap());

    for caps in re_link.captures_iter(header) {
        let url = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let params = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let is_next = re_rel.captures_iter(params).any(|rel| {
            rel.get(1)
                .or_else(|| rel.get(2))
                .map(|m| {
                    m.as_str()
                        .split_whitespace()
                        .any(|r| r.eq_ignore_ascii_case("next"))
                })
                .unwrap_or(false)
        });
        if is_next && !url.is_empty() {
            return Some(PageLink::new(url));
        }
    }
    None
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    fn query() -> Query {
        Query::new("malware created:>=2023-01-01T00:00:00Z", 100)
    }

    #[tokio::test]
    async fn concatenates_pages_in_order_and_follows_links() {
        let f = ScriptedFetcher::new(vec![
            page(json!({"items": [{"n": 1}, {"n": 2}]}), Some("https://api.test/p2")),
            page(json!({"items": [{"n": 3}]}), Some("https://api.test/p3")),
            page(json!({"items": [{"n": 4}]}), None),
        ]);
        let items = fetch_all(&f, &query(), DEFAULT_MAX_PAGES).await.unwrap();
        let ns: Vec<i64> = items
            .iter()
            .map(|r| r.value()["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, vec![1, 2, 3, 4]);
        assert_eq!(
            f.requests(),
            vec![
                "first:malware created:>=2023-01-01T00:00:00Z".to_string(),
                "next:https://api.test/p2".to_string(),
                "next:https://api.test/p3".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn missing_or_null_items_is_empty_not_error() {
        let f = ScriptedFetcher::new(vec![
            page(json!({"total_count": 0}), Some("https://api.test/p2")),
            page(json!({"items": null}), None),
        ]);
        let items = fetch_all(&f, &query(), DEFAULT_MAX_PAGES).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn failure_on_later_page_discards_everything() {
        let f = ScriptedFetcher::new(vec![
            page(json!({"items": [{"n": 1}]}), Some("https://api.test/p2")),
            Err(anyhow::anyhow!("HTTP 500")),
        ]);
        let err = fetch_all(&f, &query(), DEFAULT_MAX_PAGES).await.unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("page 2"), "{err}");
    }

    #[tokio::test]
    async fn non_array_items_and_non_object_body_are_transport_errors() {
        let f = ScriptedFetcher::new(vec![page(json!({"items": "nope"}), None)]);
        assert!(fetch_all(&f, &query(), 10).await.unwrap_err().is_transport());

        let f = ScriptedFetcher::new(vec![page(json!([1, 2]), None)]);
        assert!(fetch_all(&f, &query(), 10).await.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn stream_is_single_traversal() {
        let f = ScriptedFetcher::new(vec![
            page(json!({"items": [1]}), None),
            page(json!({"items": [2]}), None),
        ]);
        let q = query();
        let mut pages = Pages::new(&f, &q, 10);
        assert_eq!(pages.next_page().await.unwrap().unwrap().len(), 1);
        assert!(pages.next_page().await.is_none());
        assert!(pages.next_page().await.is_none());
        assert_eq!(pages.fetched(), 1);
        assert_eq!(f.requests().len(), 1);
    }

    #[tokio::test]
    async fn stream_stops_after_error() {
        let f = ScriptedFetcher::new(vec![
            Err(anyhow::anyhow!("connection reset")),
            page(json!({"items": [2]}), None),
        ]);
        let q = query();
        let mut pages = Pages::new(&f, &q, 10);
        assert!(pages.next_page().await.unwrap().is_err());
        assert!(pages.next_page().await.is_none());
    }

    #[tokio::test]
    async fn page_limit_is_an_error_not_a_truncation() {
        let f = ScriptedFetcher::new(vec![
            page(json!({"items": [1]}), Some("https://api.test/p2")),
            page(json!({"items": [2]}), Some("https://api.test/p3")),
        ]);
        let err = fetch_all(&f, &query(), 2).await.unwrap_err();
        assert!(err.to_string().contains("page limit"), "{err}");
    }

    #[test]
    fn parses_github_style_link_header() {
        let h = r#"<https://api.github.com/search/repositories?q=x&page=2>; rel="next", <https://api.github.com/search/repositories?q=x&page=34>; rel="last""#;
        assert_eq!(
            parse_next_link(h).unwrap().as_str(),
            "https://api.github.com/search/repositories?q=x&page=2"
        );
    }

    #[test]
    fn next_may_appear_anywhere_and_rel_may_be_multi_valued() {
        let h = r#"<https://a.test/?page=1>; rel="prev first",  <https://a.test/?page=3> ; rel = "last next""#;
        assert_eq!(parse_next_link(h).unwrap().as_str(), "https://a.test/?page=3");

        let unquoted = "<https://a.test/?page=9>; rel=next";
        assert_eq!(
            parse_next_link(unquoted).unwrap().as_str(),
            "https://a.test/?page=9"
        );
    }

    #[test]
    fn no_next_relation_means_last_page() {
        assert!(parse_next_link(r#"<https://a.test/?page=1>; rel="prev""#).is_none());
        assert!(parse_next_link("").is_none());
        assert!(parse_next_link(r#"<https://a.test/?page=1>; rel="nextish""#).is_none());
    }
}
