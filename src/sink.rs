// src/sink.rs
//! Downstream consumers of artifact batches.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::artifact::Artifact;

#[async_trait::async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Accept one poll's batch. An error keeps the source cursor where it was.
    async fn store(&self, source: &str, artifacts: &[Artifact]) -> Result<()>;
}

/// One JSON object per line, to stdout or appended to a file.
pub struct JsonLinesSink {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl JsonLinesSink {
    pub fn stdout() -> Self {
        Self {
            path: None,
            lock: Mutex::new(()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            lock: Mutex::new(()),
        }
    }

    fn render(artifacts: &[Artifact]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for a in artifacts {
            serde_json::to_writer(&mut buf, a)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

#[async_trait::async_trait]
impl ArtifactSink for JsonLinesSink {
    async fn store(&self, source: &str, artifacts: &[Artifact]) -> Result<()> {
        if artifacts.is_empty() {
            return Ok(());
        }
        let buf = Self::render(artifacts)?;
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match &self.path {
            None => {
                let mut out = std::io::stdout().lock();
                out.write_all(&buf)?;
                out.flush()?;
            }
            Some(p) => {
                if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                let mut f = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(p)
                    .with_context(|| format!("opening artifact output {}", p.display()))?;
                f.write_all(&buf)
                    .with_context(|| format!("writing artifacts from {source}"))?;
            }
        }
        Ok(())
    }
}

// --- Test helper ---
pub struct MemorySink {
    pub calls: Mutex<Vec<(String, Vec<Artifact>)>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(vec![]),
            fail: false,
        }
    }

    /// Sink that rejects every batch.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(vec![]),
            fail: true,
        }
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.iter().flat_map(|(_, a)| a.iter().cloned()).collect()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ArtifactSink for MemorySink {
    async fn store(&self, source: &str, artifacts: &[Artifact]) -> Result<()> {
        if self.fail {
            anyhow::bail!("sink unavailable");
        }
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((source.to_string(), artifacts.to_vec()));
        Ok(())
    }
}
