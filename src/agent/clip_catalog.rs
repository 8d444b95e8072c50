// SYNOID Scenes - Clip Catalog
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Owns the clip table for one run together with the set of clips already
// committed to a scene. A clip that enters the used set is never offered
// again, and the used set survives across runs through an append-only store.

use crate::error::SceneError;
use anyhow::Context;
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Header row of the persisted used-clip store.
pub const USED_STORE_HEADER: &str = "clip_id";

#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub id: String,
    pub duration_secs: f64,
    /// Raw comma-separated tags as they appear in the table.
    pub keywords: String,
    /// Lower-cased, trimmed tags.
    pub tokens: Vec<String>,
    pub file_location: PathBuf,
}

impl Clip {
    pub fn new(id: impl Into<String>, duration_secs: f64, keywords: impl Into<String>, file_location: PathBuf) -> Self {
        let keywords = keywords.into();
        let tokens = tokenize_keywords(&keywords);
        Self {
            id: id.into(),
            duration_secs,
            keywords,
            tokens,
            file_location,
        }
    }
}

/// Split a keyword cell into lower-cased tags, dropping empties.
pub fn tokenize_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Clip ids consumed so far. Remembers which ids were added during this
/// run so persistence only appends those.
#[derive(Debug, Clone, Default)]
pub struct UsedClipSet {
    ids: HashSet<String>,
    added_this_run: Vec<String>,
}

impl UsedClipSet {
    pub fn from_previous(ids: HashSet<String>) -> Self {
        Self {
            ids,
            added_this_run: Vec::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns `true` if the id was not already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.insert(id.to_string()) {
            self.added_this_run.push(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn added_this_run(&self) -> &[String] {
        &self.added_this_run
    }
}

#[derive(Debug)]
pub struct ClipCatalog {
    clips: Vec<Clip>,
    index: HashMap<String, usize>,
    used: UsedClipSet,
}

impl ClipCatalog {
    pub fn new(clips: Vec<Clip>) -> Result<Self, SceneError> {
        Self::with_used(clips, UsedClipSet::default())
    }

    pub fn with_used(clips: Vec<Clip>, used: UsedClipSet) -> Result<Self, SceneError> {
        if clips.is_empty() {
            return Err(SceneError::Config("clip catalog is empty".into()));
        }
        let index = clips
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Ok(Self { clips, index, used })
    }

    /// Every clip not yet committed to a scene, in table order.
    pub fn unused(&self) -> Vec<&Clip> {
        self.clips
            .iter()
            .filter(|c| !self.used.contains(&c.id))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Clip> {
        self.index.get(id).map(|&i| &self.clips[i])
    }

    pub fn is_used(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    /// Commit a clip. Idempotent; returns `true` only the first time.
    pub fn mark_used(&mut self, id: &str) -> bool {
        let fresh = self.used.insert(id);
        if fresh {
            debug!("[CATALOG] Clip {} committed", id);
        }
        fresh
    }

    pub fn used(&self) -> &UsedClipSet {
        &self.used
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Append this run's newly used ids to the store.
    pub fn persist(&self, store: &UsedClipStore) -> anyhow::Result<usize> {
        store.append(self.used.added_this_run())
    }
}

/// Append-only CSV of consumed clip ids, one per row under a `clip_id` header.
#[derive(Debug, Clone)]
pub struct UsedClipStore {
    path: PathBuf,
}

impl UsedClipStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ids recorded by earlier runs. A missing store is an empty set.
    pub fn load(&self) -> anyhow::Result<HashSet<String>> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Opening used-clip store {:?}", self.path))?;

        let mut ids = HashSet::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("Reading {:?}", self.path))?;
            if let Some(id) = record.get(0).map(str::trim).filter(|s| !s.is_empty()) {
                ids.insert(id.to_string());
            }
        }

        info!("[CATALOG] {} clips already used by previous runs", ids.len());
        Ok(ids)
    }

    /// Append ids that the store does not already hold. Returns how many
    /// rows were written.
    pub fn append(&self, ids: &[String]) -> anyhow::Result<usize> {
        let existing = self.load()?;
        let mut pending: Vec<&String> = Vec::new();
        let mut seen = HashSet::new();
        for id in ids {
            if !existing.contains(id) && seen.insert(id) {
                pending.push(id);
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating store directory {:?}", parent))?;
        }

        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        let needs_newline = !needs_header && !ends_with_newline(&self.path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Opening {:?} for append", self.path))?;
        if needs_newline {
            file.write_all(b"\n")
                .with_context(|| format!("Terminating last row of {:?}", self.path))?;
        }

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record([USED_STORE_HEADER])?;
        }
        for id in &pending {
            writer.write_record([id.as_str()])?;
        }
        writer.flush()?;

        info!("[CATALOG] Persisted {} newly used clips to {:?}", pending.len(), self.path);
        Ok(pending.len())
    }
}

/// Whether a non-empty file's last byte is `\n`. Hand-edited stores often
/// lose the final newline.
fn ends_with_newline(path: &Path) -> anyhow::Result<bool> {
    let mut file = File::open(path).with_context(|| format!("Opening {:?}", path))?;
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(id: &str, secs: f64, keywords: &str) -> Clip {
        Clip::new(id, secs, keywords, PathBuf::from(format!("Clips/{}.mp4", id)))
    }

    #[test]
    fn test_tokenize_keywords() {
        assert_eq!(tokenize_keywords(" Tank ,desert,, "), vec!["tank", "desert"]);
        assert!(tokenize_keywords("").is_empty());
    }

    #[test]
    fn test_unused_respects_used_set() {
        let mut catalog = ClipCatalog::new(vec![clip("a", 3.0, ""), clip("b", 4.0, ""), clip("c", 2.0, "")]).unwrap();
        assert!(catalog.mark_used("b"));
        assert!(!catalog.mark_used("b"));

        let ids: Vec<&str> = catalog.unused().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(catalog.used().added_this_run(), &["b".to_string()]);
    }

    #[test]
    fn test_previous_ids_are_excluded_but_not_new() {
        let previous: HashSet<String> = ["a".to_string()].into_iter().collect();
        let catalog = ClipCatalog::with_used(vec![clip("a", 3.0, ""), clip("b", 4.0, "")], UsedClipSet::from_previous(previous)).unwrap();
        assert_eq!(catalog.unused().len(), 1);
        assert!(catalog.used().added_this_run().is_empty());
    }

    #[test]
    fn test_empty_catalog_is_config_error() {
        assert!(ClipCatalog::new(Vec::new()).unwrap_err().is_fatal());
    }

    #[test]
    fn test_store_append_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsedClipStore::new(dir.path().join("used_clips.csv"));
        assert!(store.load().unwrap().is_empty());

        let written = store.append(&["a".to_string(), "b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(written, 2);

        let written = store.append(&["b".to_string(), "c".to_string()]).unwrap();
        assert_eq!(written, 1);

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "clip_id\na\nb\nc\n");
        assert_eq!(store.load().unwrap().len(), 3);
    }

    #[test]
    fn test_append_after_hand_edit_without_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("used_clips.csv");
        std::fs::write(&path, "clip_id\na").unwrap();
        let store = UsedClipStore::new(&path);

        assert_eq!(store.append(&["b".to_string()]).unwrap(), 1);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "clip_id\na\nb\n");
        let ids = store.load().unwrap();
        assert!(ids.contains("a") && ids.contains("b"));
        assert_eq!(ids.len(), 2);
    }
}
