use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{anyhow, Context};

use crate::ValueMap;

/// Saved value maps keyed by template id. Concurrent saves to one id are last-write-wins.
pub trait ValueStore: Send + Sync {
    fn load(&self, template_id: &str) -> anyhow::Result<Option<ValueMap>>;
    fn save(&self, template_id: &str, values: &ValueMap) -> anyhow::Result<()>;
    /// Returns whether anything was stored for the id.
    fn remove(&self, template_id: &str) -> anyhow::Result<bool>;
    fn clear(&self) -> anyhow::Result<()>;

    /// Called once when the owning engine stops. Process-lifetime stores drop their
    /// contents; durable stores keep them.
    fn shutdown(&self) -> anyhow::Result<()> {
        self.clear()
    }
}

/// Lives as long as the process.
#[derive(Debug, Default)]
pub struct InMemoryValueStore {
    maps: RwLock<HashMap<String, ValueMap>>,
}

impl InMemoryValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("value store lock poisoned")
}

impl ValueStore for InMemoryValueStore {
    fn load(&self, template_id: &str) -> anyhow::Result<Option<ValueMap>> {
        let maps = self.maps.read().map_err(poisoned)?;
        Ok(maps.get(template_id).cloned())
    }

    fn save(&self, template_id: &str, values: &ValueMap) -> anyhow::Result<()> {
        let mut maps = self.maps.write().map_err(poisoned)?;
        maps.insert(template_id.to_string(), values.clone());
        Ok(())
    }

    fn remove(&self, template_id: &str) -> anyhow::Result<bool> {
        let mut maps = self.maps.write().map_err(poisoned)?;
        Ok(maps.remove(template_id).is_some())
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.maps.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

/// One `<template_id>.json` object per template under `dir`.
#[derive(Clone, Debug)]
pub struct JsonFileValueStore {
    dir: PathBuf,
}

impl JsonFileValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create value store dir: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, template_id: &str) -> anyhow::Result<PathBuf> {
        let id = template_id.trim();
        if !is_valid_id(id) {
            return Err(anyhow!("invalid template id: {template_id:?}"));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}


impl ValueStore for JsonFileValueStore {
    fn load(&self, template_id: &str) -> anyhow::Result<Option<ValueMap>> {
        let path = self.path_for(template_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read saved values: {}", path.display()))?;
        let values: ValueMap = serde_json::from_str(&text)
            .with_context(|| format!("parse saved values: {}", path.display()))?;
        Ok(Some(values))
    }

    fn save(&self, template_id: &str, values: &ValueMap) -> anyhow::Result<()> {
        let path = self.path_for(template_id)?;
        let json = serde_json::to_string_pretty(values).context("serialize values")?;
        std::fs::write(&path, json)
            .with_context(|| format!("write saved values: {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, template_id: &str) -> anyhow::Result<bool> {
        let path = self.path_for(template_id)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("remove saved values: {}", path.display()))?;
        Ok(true)
    }

    /// Removes the files this store could have written. Other files in `dir` stay.
    fn clear(&self) -> anyhow::Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("list value store dir: {}", self.dir.display()))?;
        for entry in entries {
            let entry = entry.context("value store dir entry")?;
            let path = entry.path();
            let owned = path.extension().is_some_and(|e| e == "json")
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(is_valid_id)
                && entry.file_type().is_ok_and(|t| t.is_file());
            if owned {
                std::fs::remove_file(&path)
                    .with_context(|| format!("remove saved values: {}", path.display()))?;
            }
        }
        Ok(())
    }

    fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Saved values overlaid by the request; request entries win, empty strings included.
pub fn merge_saved_values(saved: Option<&ValueMap>, request: &ValueMap) -> ValueMap {
    let mut merged = saved.cloned().unwrap_or_default();
    merged.extend(request.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
