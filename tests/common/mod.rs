// tests/common/mod.rs
//
// Local stand-in for a search API that paginates via `Link: <...>; rel="next"`.
// Page 1 is served at /search, page N at /page/N.
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
pub struct MockPage {
    pub status: u16,
    pub body: String,
    pub next: bool,
    /// Send `rel="last"` and `rel="next"` as two separate `Link` lines.
    pub split_link: bool,
    pub delay_ms: u64,
}

impl MockPage {
    pub fn repos(names: &[&str], next: bool) -> Self {
        let items: Vec<Value> = names
            .iter()
            .map(|n| {
                json!({
                    "full_name": n,
                    "html_url": format!("https://github.com/{n}"),
                    "created_at": "2023-01-02T00:00:00Z"
                })
            })
            .collect();
        Self::json(json!({ "total_count": items.len(), "items": items }), next)
    }

    pub fn json(body: Value, next: bool) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            next,
            split_link: false,
            delay_ms: 0,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: r#"{"message":"boom"}"#.to_string(),
            next: false,
            split_link: false,
            delay_ms: 0,
        }
    }

    pub fn raw(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            next: false,
            split_link: false,
            delay_ms: 0,
        }
    }

    pub fn with_split_link(mut self) -> Self {
        self.split_link = true;
        self
    }

    pub fn delayed(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

#[derive(Clone, Debug)]
pub struct Hit {
    pub path: String,
    pub params: HashMap<String, String>,
    pub authorization: Option<String>,
}

#[derive(Clone)]
struct MockApi {
    base: String,
    pages: Arc<Vec<MockPage>>,
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl MockApi {
    fn record(&self, path: String, params: HashMap<String, String>, headers: &HeaderMap) {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.hits.lock().unwrap().push(Hit {
            path,
            params,
            authorization,
        });
    }

    async fn respond(&self, page_no: usize) -> Response {
        let Some(page) = self.pages.get(page_no - 1) else {
            return Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::empty())
                .unwrap();
        };
        if page.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(page.delay_ms)).await;
        }
        let mut rsp = Response::builder()
            .status(page.status)
            .header(header::CONTENT_TYPE, "application/json");
        if page.next {
            let next = format!(r#"<{}/page/{}>; rel="next""#, self.base, page_no + 1);
            let last = format!(r#"<{}/page/{}>; rel="last""#, self.base, self.pages.len());
            if page.split_link {
                // `header` appends, so these go out as two lines
                rsp = rsp.header(header::LINK, last).header(header::LINK, next);
            } else {
                rsp = rsp.header(header::LINK, format!("{next}, {last}"));
            }
        }
        rsp.body(Body::from(page.body.clone())).unwrap()
    }
}

async fn first_page(
    State(api): State<MockApi>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    api.record("/search".to_string(), params, &headers);
    api.respond(1).await
}

async fn later_page(
    State(api): State<MockApi>,
    Path(n): Path<usize>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    api.record(format!("/page/{n}"), params, &headers);
    api.respond(n.max(1)).await
}

pub struct MockServer {
    pub base: String,
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl MockServer {
    pub async fn start(pages: Vec<MockPage>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock api");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));
        let api = MockApi {
            base: base.clone(),
            pages: Arc::new(pages),
            hits: Arc::new(Mutex::new(Vec::new())),
        };
        let hits = api.hits.clone();
        let app = Router::new()
            .route("/search", get(first_page))
            .route("/page/{n}", get(later_page))
            .with_state(api);
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock api serve");
        });
        Self { base, hits }
    }

    pub fn search_url(&self) -> String {
        format!("{}/search", self.base)
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }
}

/// GitHub source config pointed at the mock server.
pub fn github_source(server: &MockServer, name: &str, search: &str) -> ioc_ingestor::config::SourceConfig {
    let mut cfg = ioc_ingestor::config::SourceConfig::new(name, search);
    cfg.search_url = Some(server.search_url());
    cfg
}
