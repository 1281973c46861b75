//! Where save envelopes live between sessions.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{SaveError, SaveFile, SaveResult};

/// Slot-addressed storage for save envelopes.
pub trait SaveStore {
    /// Store `save` in its slot, returning the envelope it supersedes.
    fn put(&mut self, save: SaveFile) -> SaveResult<Option<SaveFile>>;
    fn get(&self, slot: u32) -> SaveResult<Option<SaveFile>>;
    /// Occupied slots in ascending order.
    fn slots(&self) -> SaveResult<Vec<u32>>;
    fn delete(&mut self, slot: u32) -> SaveResult<bool>;
}

/// In-memory store that keeps every superseded envelope.
#[derive(Debug, Clone, Default)]
pub struct MemorySaveStore {
    current: BTreeMap<u32, SaveFile>,
    history: BTreeMap<u32, Vec<SaveFile>>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Superseded envelopes for `slot`, oldest first.
    pub fn history(&self, slot: u32) -> &[SaveFile] {
        self.history.get(&slot).map(Vec::as_slice).unwrap_or_default()
    }
}

impl SaveStore for MemorySaveStore {
    fn put(&mut self, save: SaveFile) -> SaveResult<Option<SaveFile>> {
        let slot = save.slot;
        let previous = self.current.insert(slot, save);
        if let Some(old) = &previous {
            self.history.entry(slot).or_default().push(old.clone());
        }
        Ok(previous)
    }

    fn get(&self, slot: u32) -> SaveResult<Option<SaveFile>> {
        Ok(self.current.get(&slot).cloned())
    }

    fn slots(&self) -> SaveResult<Vec<u32>> {
        Ok(self.current.keys().copied().collect())
    }

    fn delete(&mut self, slot: u32) -> SaveResult<bool> {
        Ok(self.current.remove(&slot).is_some())
    }
}

/// One JSON file per slot under a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous envelope intact.
#[derive(Debug, Clone)]
pub struct DirectorySaveStore {
    root: PathBuf,
}

impl DirectorySaveStore {
    /// Open `root`, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> SaveResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| io_error(&root, source))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, slot: u32) -> PathBuf {
        self.root.join(format!("slot-{slot}.json"))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SaveError {
    SaveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn parse_slot(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("slot-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

impl SaveStore for DirectorySaveStore {
    fn put(&mut self, save: SaveFile) -> SaveResult<Option<SaveFile>> {
        let previous = self.get(save.slot)?;
        let path = self.slot_path(save.slot);
        let staging = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&save)?;
        fs::write(&staging, body).map_err(|source| io_error(&staging, source))?;
        fs::rename(&staging, &path).map_err(|source| io_error(&path, source))?;
        debug!(slot = save.slot, path = %path.display(), "save written");
        Ok(previous)
    }

    fn get(&self, slot: u32) -> SaveResult<Option<SaveFile>> {
        let path = self.slot_path(slot);
        match fs::read(&path) {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    fn slots(&self) -> SaveResult<Vec<u32>> {
        let entries = fs::read_dir(&self.root).map_err(|source| io_error(&self.root, source))?;
        let mut slots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&self.root, source))?;
            if let Some(slot) = entry.file_name().to_str().and_then(parse_slot) {
                slots.push(slot);
            }
        }
        slots.sort_unstable();
        Ok(slots)
    }

    fn delete(&mut self, slot: u32) -> SaveResult<bool> {
        let path = self.slot_path(slot);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(io_error(&path, source)),
        }
    }
}
