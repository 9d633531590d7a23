// src/config/mod.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::http::{Credentials, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::source::cursor::DEFAULT_LOOKBACK_DAYS;
use crate::source::pagination::DEFAULT_MAX_PAGES;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

fn default_interval_secs() -> u64 {
    3600
}
fn default_poll_timeout_secs() -> u64 {
    120
}
fn default_state_path() -> PathBuf {
    PathBuf::from("state/cursors.json")
}
fn default_module() -> String {
    "github".to_string()
}
fn default_lookback_days() -> i64 {
    DEFAULT_LOOKBACK_DAYS
}
fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Wall-clock limit for one poll cycle of one source.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// JSON-lines output file; stdout when unset.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Source kind; only "github" today.
    #[serde(default = "default_module")]
    pub module: String,
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub username: String,
    /// "ENV" means: read from GITHUB_TOKEN
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Override of the search endpoint (self-hosted instances, tests).
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Pages one poll may walk before it fails.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

// Same masking as `Credentials`; configs end up in logs.
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.token.is_empty() { "" } else { "***" };
        f.debug_struct("SourceConfig")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("search", &self.search)
            .field("username", &self.username)
            .field("token", &token)
            .field("lookback_days", &self.lookback_days)
            .field("search_url", &self.search_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, search: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: default_module(),
            search: search.into(),
            username: String::new(),
            token: String::new(),
            lookback_days: default_lookback_days(),
            search_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_pages: default_max_pages(),
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(&self.username, &self.token)
    }
}

impl IngestConfig {
    /// Load from an explicit path. TOML or JSON, picked by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading ingest config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing ingest config {}", path.display()))?;
        cfg.resolve_env_tokens()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $INGEST_CONFIG_PATH
    /// 2) config/ingest.toml
    /// 3) config/ingest.json
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
        }
        for candidate in ["config/ingest.toml", "config/ingest.json"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Err(anyhow!(
            "no ingest config found (set {ENV_CONFIG_PATH} or create config/ingest.toml)"
        ))
    }

    fn resolve_env_tokens(&mut self) -> Result<()> {
        for s in &mut self.sources {
            if s.token.trim().eq_ignore_ascii_case("env") {
                s.token = env::var(ENV_GITHUB_TOKEN).map_err(|_| {
                    anyhow!("source {:?}: missing {ENV_GITHUB_TOKEN} env var", s.name)
                })?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("ingest config declares no sources");
        }
        if self.interval_secs == 0 {
            bail!("interval_secs must be > 0");
        }
        if self.poll_timeout_secs == 0 {
            bail!("poll_timeout_secs must be > 0");
        }
        let mut names = HashSet::new();
        for s in &self.sources {
            let name = s.name.trim();
            if name.is_empty() {
                bail!("source with empty name");
            }
            // cursors are stored per name
            if !names.insert(name.to_string()) {
                bail!("duplicate source name {name:?}");
            }
            if !(1..=MAX_LOOKBACK_DAYS).contains(&s.lookback_days) {
                bail!("source {name:?}: lookback_days must be within 1..={MAX_LOOKBACK_DAYS}");
            }
            if s.request_timeout_secs == 0 {
                bail!("source {name:?}: request_timeout_secs must be > 0");
            }
            if s.max_pages == 0 {
                bail!("source {name:?}: max_pages must be > 0");
            }
        }
        Ok(())
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<IngestConfig> {
    match hint_ext {
        "toml" => return Ok(toml::from_str(s)?),
        "json" => return Ok(serde_json::from_str(s)?),
        _ => {}
    }
    if let Ok(v) = toml::from_str(s) {
        return Ok(v);
    }
    serde_json::from_str(s).map_err(|_| anyhow!("unsupported ingest config format"))
}
