//! Model cache: hierarchy and draw-range data per loaded model.
//!
//! Entries are written once per model load and read many times. Each entry is
//! persisted through a [`CacheBackend`] and mirrored in memory; a key missing
//! from the mirror is looked up in the backend before it counts as a miss.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::draw_range::{self, DrawRange, MeshDrawRanges, RangeId};
use crate::error::{PickError, Result};
use crate::hierarchy::{self, ElementId, Hierarchy, TreeNode};

/// Everything cached for one loaded model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCacheEntry {
    /// Unique per-load key.
    pub key: String,
    pub hierarchy: Hierarchy,
    #[serde(rename = "drawRanges")]
    pub draw_ranges: MeshDrawRanges,
}

/// Durable storage for cache entries.
pub trait CacheBackend: Send {
    /// Loads the entry stored under `key`.
    fn load(&self, key: &str) -> Result<Option<ModelCacheEntry>>;

    /// Stores an entry, replacing any previous one with the same key.
    fn store(&mut self, entry: &ModelCacheEntry) -> Result<()>;

    /// Deletes the entry stored under `key`. Missing keys are not an error.
    fn remove(&mut self, key: &str) -> Result<()>;

    /// Lists stored keys.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Backend that keeps nothing beyond the process lifetime.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, ModelCacheEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<ModelCacheEntry>> {
        Ok(self.entries.get(key).cloned())
    }

    fn store(&mut self, entry: &ModelCacheEntry) -> Result<()> {
        self.entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// Backend storing one JSON document per key in a directory.
///
/// Files are named by a 64-bit hash of the key, so key length and characters
/// never reach the file system. The full key is stored inside the document
/// and checked on load.
#[derive(Debug, Clone)]
pub struct JsonDirBackend {
    dir: PathBuf,
}

/// Just the key of a stored entry.
#[derive(Deserialize)]
struct StoredKey {
    key: String,
}

impl JsonDirBackend {
    /// Opens (and creates if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    fn read(path: &Path) -> Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl CacheBackend for JsonDirBackend {
    fn load(&self, key: &str) -> Result<Option<ModelCacheEntry>> {
        let Some(text) = Self::read(&self.path_for(key))? else {
            return Ok(None);
        };
        let entry: ModelCacheEntry = serde_json::from_str(&text)?;
        if entry.key != key {
            log::debug!("cache file for '{key}' holds '{}'", entry.key);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn store(&mut self, entry: &ModelCacheEntry) -> Result<()> {
        let path = self.path_for(&entry.key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(entry)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        let Some(text) = Self::read(&path)? else {
            return Ok(());
        };
        // another key sharing the file name is left alone
        let stored: StoredKey = serde_json::from_str(&text)?;
        if stored.key == key {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(text) = Self::read(&path)? else {
                continue;
            };
            match serde_json::from_str::<StoredKey>(&text) {
                Ok(stored) => keys.push(stored.key),
                Err(e) => log::warn!("skipping unreadable cache file {}: {e}", path.display()),
            }
        }
        Ok(keys)
    }
}

/// Fixed-length file name for a cache key.
fn file_stem(key: &str) -> String {
    use std::hash::Hasher;

    let mut hasher = rustc_hash::FxHasher::default();
    hasher.write(key.as_bytes());
    hasher.write_usize(key.len());
    format!("{:016x}", hasher.finish())
}

/// In-memory mirror of the durable cache plus the lookups answered from it.
pub struct ModelCache {
    backend: Box<dyn CacheBackend>,
    entries: HashMap<String, ModelCacheEntry>,
    node_ids: HashMap<String, HashMap<ElementId, u32>>,
}

impl ModelCache {
    pub fn new(backend: Box<dyn CacheBackend>) -> Self {
        Self {
            backend,
            entries: HashMap::new(),
            node_ids: HashMap::new(),
        }
    }

    /// A cache without durable storage.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    /// Validates, persists and mirrors a model's data.
    pub fn add(
        &mut self,
        key: &str,
        hierarchy: Hierarchy,
        draw_ranges: MeshDrawRanges,
    ) -> Result<()> {
        draw_range::validate_mesh_ranges(&draw_ranges)?;
        let entry = ModelCacheEntry {
            key: key.to_string(),
            hierarchy,
            draw_ranges,
        };
        if let Err(e) = self.backend.store(&entry) {
            // the in-memory mirror still serves this session
            log::error!("failed to persist model '{key}': {e}");
        }
        self.node_ids.remove(key);
        self.entries.insert(key.to_string(), entry);
        log::debug!("cached model '{key}'");
        Ok(())
    }

    /// Evicts a model from memory and durable storage.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        self.node_ids.remove(key);
        self.backend.remove(key)
    }

    /// Keys known in memory or in durable storage.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: HashSet<String> = self.entries.keys().cloned().collect();
        match self.backend.keys() {
            Ok(stored) => keys.extend(stored),
            Err(e) => log::error!("failed to list cached models: {e}"),
        }
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();
        keys
    }

    /// Returns the entry for `key`, loading it from durable storage if needed.
    pub fn entry(&mut self, key: &str) -> Option<&ModelCacheEntry> {
        if !self.entries.contains_key(key) {
            match self.backend.load(key) {
                Ok(Some(entry)) => {
                    log::debug!("restored model '{key}' from durable cache");
                    self.entries.insert(key.to_string(), entry);
                }
                Ok(None) => {
                    log::error!("no cache entry for model '{key}'");
                    return None;
                }
                Err(e) => {
                    log::error!("failed to load model '{key}' from cache: {e}");
                    return None;
                }
            }
        }
        self.entries.get(key)
    }

    /// Like [`entry`](Self::entry) but reports a miss as an error.
    pub fn require(&mut self, key: &str) -> Result<&ModelCacheEntry> {
        self.entry(key)
            .ok_or_else(|| PickError::ModelNotCached(key.to_string()))
    }

    /// Builds the element tree with ids starting at `start_id + 1`.
    ///
    /// `hierarchy` overrides the cached hierarchy when given.
    pub fn build_hierarchy(
        &mut self,
        key: &str,
        hierarchy: Option<&Hierarchy>,
        start_id: u32,
    ) -> Option<TreeNode> {
        let built = match hierarchy {
            Some(h) => hierarchy::build_tree(h, start_id),
            None => hierarchy::build_tree(&self.entry(key)?.hierarchy, start_id),
        };
        let Some(built) = built else {
            log::warn!("model '{key}' has no hierarchy root");
            return None;
        };
        self.node_ids.insert(key.to_string(), built.node_ids);
        Some(built.root)
    }

    /// Resolves a triangle index to the draw range containing it.
    pub fn get_draw_range(&mut self, key: &str, mesh: &str, face_index: u32) -> Option<DrawRange> {
        self.lookup(key, mesh, draw_range::face_offset(face_index))
    }

    /// Resolves a raw vertex index to the draw range containing it.
    pub fn get_point_id(&mut self, key: &str, mesh: &str, point_index: u32) -> Option<DrawRange> {
        self.lookup(key, mesh, u64::from(point_index))
    }

    fn lookup(&mut self, key: &str, mesh: &str, offset: u64) -> Option<DrawRange> {
        let ranges = self.entry(key)?.draw_ranges.get(mesh);
        let Some(ranges) = ranges else {
            log::debug!("model '{key}' has no draw ranges for mesh '{mesh}'");
            return None;
        };
        let found = draw_range::find_containing(ranges, offset);
        if found.is_none() {
            log::debug!("offset {offset} of '{key}/{mesh}' is not in any draw range");
        }
        found
    }

    /// Semantic name of the element behind a range id.
    pub fn get_name_from_range_id(&mut self, key: &str, range_id: &str) -> Option<String> {
        let name = self
            .entry(key)?
            .hierarchy
            .get(range_id)
            .map(|e| e.name.clone());
        if name.is_none() {
            log::debug!("model '{key}' has no element '{range_id}'");
        }
        name
    }

    /// Reverse lookup: every `(mesh, range id)` whose element name is in `names`.
    ///
    /// Results are sorted by mesh name, then range id.
    pub fn get_draw_ranges_by_member_names(
        &mut self,
        key: &str,
        names: &[String],
    ) -> Vec<(String, RangeId)> {
        let Some(entry) = self.entry(key) else {
            return Vec::new();
        };
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        let members: HashSet<&str> = entry
            .hierarchy
            .iter()
            .filter(|(_, e)| wanted.contains(e.name.as_str()))
            .map(|(id, _)| id.as_str())
            .collect();
        let members = &members;

        let mut found: Vec<(String, RangeId)> = entry
            .draw_ranges
            .iter()
            .flat_map(|(mesh, ranges)| {
                ranges
                    .keys()
                    .filter(move |id| members.contains(id.as_str()))
                    .map(move |id| (mesh.clone(), id.clone()))
            })
            .collect();
        found.sort();
        found
    }

    /// Tree id assigned to an element by the last [`build_hierarchy`](Self::build_hierarchy).
    pub fn get_node_id(&self, key: &str, element_id: &str) -> Option<u32> {
        self.node_ids.get(key)?.get(element_id).copied()
    }
}
