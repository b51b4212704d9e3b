use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use engine_logging::{engine_info, engine_warn};
use jobscout_engine::{AtomicFileWriter, DedupStore, PersistError, StoreError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedState {
    updated_at: Option<String>,
    seen: Vec<String>,
}

/// Seen apply links kept in a RON file between runs. Lookups and inserts
/// hit memory only; [`RonSeenStore::save`] writes the file.
#[derive(Debug)]
pub struct RonSeenStore {
    path: PathBuf,
    seen: RwLock<BTreeSet<String>>,
}

impl RonSeenStore {
    /// Starts empty at `path` without reading it.
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            seen: RwLock::new(BTreeSet::new()),
        }
    }

    /// Reads `path`. A missing or unreadable file gives an empty store.
    pub fn load(path: PathBuf) -> Self {
        let seen = read_state(&path)
            .map(|state| state.seen.into_iter().collect())
            .unwrap_or_default();
        Self {
            path,
            seen: RwLock::new(seen),
        }
    }

    pub fn len(&self) -> usize {
        self.seen.read().map(|seen| seen.len()).unwrap_or(0)
    }

    pub fn save(&self) -> Result<PathBuf, PersistError> {
        let seen = self
            .seen
            .read()
            .map(|seen| seen.iter().cloned().collect())
            .unwrap_or_default();
        let state = PersistedState {
            updated_at: Some(Utc::now().to_rfc3339()),
            seen,
        };
        let content = ron::ser::to_string_pretty(&state, ron::ser::PrettyConfig::new())
            .map_err(|err| {
                PersistError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
            })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let filename = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                PersistError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("state path {:?} has no file name", self.path),
                ))
            })?;
        AtomicFileWriter::new(dir).write(filename, &content)
    }
}

fn read_state(path: &Path) -> Option<PersistedState> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            engine_warn!("Failed to read seen links from {:?}: {}", path, err);
            return None;
        }
    };
    match ron::from_str::<PersistedState>(&content) {
        Ok(state) => {
            engine_info!("Loaded {} seen links from {:?}", state.seen.len(), path);
            Some(state)
        }
        Err(err) => {
            engine_warn!("Failed to parse seen links from {:?}: {}", path, err);
            None
        }
    }
}

impl DedupStore for RonSeenStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.seen
            .read()
            .map(|seen| seen.contains(key))
            .map_err(|err| StoreError(err.to_string()))
    }

    fn insert(&self, key: &str) -> Result<(), StoreError> {
        self.seen
            .write()
            .map(|mut seen| {
                seen.insert(key.to_string());
            })
            .map_err(|err| StoreError(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RonSeenStore::load(dir.path().join("seen.ron"));
        assert_eq!(store.len(), 0);
        assert!(!store.exists("https://a.example/jobs/1").unwrap());
    }

    #[test]
    fn saved_links_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("seen.ron");
        let store = RonSeenStore::empty(path.clone());
        store.insert("https://a.example/jobs/2").unwrap();
        store.insert("https://a.example/jobs/1").unwrap();
        store.insert("https://a.example/jobs/1").unwrap();
        assert_eq!(store.save().unwrap(), path);

        let reloaded = RonSeenStore::load(path);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.exists("https://a.example/jobs/1").unwrap());
        assert!(!reloaded.exists("https://a.example/jobs/3").unwrap());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.ron");
        fs::write(&path, "not ron at all {").unwrap();
        assert_eq!(RonSeenStore::load(path).len(), 0);
    }
}
