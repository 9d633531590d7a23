// src/state.rs
//! Per-source cursor persistence. Owned by the scheduler, not by sources.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::source::cursor::Cursor;

pub trait CursorStore: Send + Sync {
    fn load(&self, source: &str) -> Result<Option<Cursor>>;
    fn save(&self, source: &str, cursor: &Cursor) -> Result<()>;
}

/// JSON object `{ "<source name>": "<cursor>" }` on disk.
pub struct FileCursorStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, Cursor>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("reading cursor state {}", self.path.display()))?;
        if data.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&data)
            .with_context(|| format!("parsing cursor state {}", self.path.display()))
    }

    fn write_all(&self, all: &BTreeMap<String, Cursor>) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating state dir {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(all)?;
        fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing cursor state {}", self.path.display()))?;
        Ok(())
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self, source: &str) -> Result<Option<Cursor>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.remove(source))
    }

    fn save(&self, source: &str, cursor: &Cursor) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut all = self.read_all()?;
        all.insert(source.to_string(), cursor.clone());
        self.write_all(&all)
    }
}

#[derive(Default)]
pub struct MemoryCursorStore {
    inner: Mutex<HashMap<String, Cursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(self, source: &str, cursor: Cursor) -> Self {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(source.to_string(), cursor);
        self
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self, source: &str) -> Result<Option<Cursor>> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(source).cloned())
    }

    fn save(&self, source: &str, cursor: &Cursor) -> Result<()> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(source.to_string(), cursor.clone());
        Ok(())
    }
}
