use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Reads a JSON array of identifiers. A missing, empty or unreadable file
/// counts as an empty list; non-string entries are kept as their JSON text.
pub fn load_ids(path: &Path) -> Vec<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(values) => values
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Err(e) => {
            warn!("Ignoring unreadable id file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Writes a compact JSON array, replacing the file only once the new
/// content is fully on disk.
pub fn save_ids(path: &Path, ids: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string(ids).context("Failed to encode id list")?;
    write_atomic(path, content.as_bytes())
}

pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, content).with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Job ids handled in earlier runs. Only ever grows.
#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    ids: Vec<String>,
    index: HashSet<String>,
}

impl SeenStore {
    pub fn open(path: &Path) -> Self {
        let mut store = Self {
            path: path.to_path_buf(),
            ids: Vec::new(),
            index: HashSet::new(),
        };
        for id in load_ids(path) {
            store.insert(id);
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Adds an id; returns false when it was already recorded.
    pub fn insert(&mut self, id: String) -> bool {
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.ids.push(id);
        true
    }

    /// Records every id observed this run and persists the whole set.
    pub fn record<I>(&mut self, observed: I) -> Result<usize>
    where
        I: IntoIterator<Item = String>,
    {
        let added = observed.into_iter().filter(|id| self.insert(id.clone())).count();
        save_ids(&self.path, &self.ids)?;
        Ok(added)
    }
}

/// Employer names never worth screening. Matching is exact.
#[derive(Debug)]
pub struct Blocklist {
    path: PathBuf,
    names: Vec<String>,
}

impl Blocklist {
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            names: load_ids(path),
        }
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self {
            path: PathBuf::new(),
            names,
        }
    }

    pub fn contains(&self, employer: &str) -> bool {
        self.names.iter().any(|n| n == employer)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn add(&mut self, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return Ok(false);
        }
        self.names.push(name.to_string());
        save_ids(&self.path, &self.names)?;
        Ok(true)
    }

    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let before = self.names.len();
        self.names.retain(|n| n != name.trim());
        if self.names.len() == before {
            return Ok(false);
        }
        save_ids(&self.path, &self.names)?;
        Ok(true)
    }
}
