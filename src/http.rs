// src/http.rs
//! reqwest-backed page fetcher for search APIs that paginate via `Link`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LINK};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::error::PollError;
use crate::source::pagination::{parse_next_link, Page, PageFetcher, PageLink, PageRequest};

const USER_AGENT: &str = concat!("ioc-ingestor/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Basic-auth pair. Only exists when both halves are set.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

impl Credentials {
    pub fn from_parts(username: &str, token: &str) -> Option<Self> {
        let (u, t) = (username.trim(), token.trim());
        if u.is_empty() || t.is_empty() {
            return None;
        }
        Some(Self {
            username: u.to_string(),
            token: t.to_string(),
        })
    }
}

// Never print the token.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"***")
            .finish()
    }
}

#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
    search_url: String,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new(
        search_url: impl Into<String>,
        credentials: Option<Credentials>,
    ) -> Result<Self, PollError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| PollError::Config(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            search_url: search_url.into(),
            credentials,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// Per-request limit, applied to every page.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(c) => req.basic_auth(&c.username, Some(&c.token)),
            None => req,
        }
    }
}

/// `rel="next"` target across every `Link` header line; relations may be
/// split over several lines.
fn next_link(headers: &HeaderMap) -> Option<PageLink> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(parse_next_link)
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, request: PageRequest<'_>) -> Result<Page> {
        let req = match request {
            PageRequest::First(query) => self.client.get(&self.search_url).query(&query.params()),
            PageRequest::Next(link) => self.client.get(link.as_str()),
        };
        let rsp = self
            .authorize(req)
            .timeout(self.timeout)
            .send()
            .await
            .context("search http get()")?;

        let status = rsp.status();
        if !status.is_success() {
            return Err(anyhow!("search HTTP error: {status}"));
        }

        let next = next_link(rsp.headers());
        let body: Value = rsp.json().await.context("decoding search response body")?;

        Ok(Page { body, next })
    }
}
