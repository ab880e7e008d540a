//! ManifestTable persistence, stored alongside the chunks in `.filePartsLoader`.
//!
//! Maps a user-visible filename (basename only) to the ordered list of
//! chunk digests that reassemble it. Persisted as JSON, written to a temp
//! file and renamed into place, rather than a language-native
//! serialization that would need to execute arbitrary code to parse back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const MANIFEST_FILE_NAME: &str = ".filePartsLoader";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("manifest file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
struct ManifestFile {
    files: HashMap<String, Vec<String>>,
}

/// The persisted mapping from filename to its ordered chunk digests.
/// Intended to have a single writer (the uploading node); writes are still
/// serialized internally with a mutex so this table's own temp-then-rename
/// write is never interleaved with itself.
pub struct ManifestTable {
    path: PathBuf,
    inner: Mutex<ManifestFile>,
}

impl ManifestTable {
    /// Loads the manifest table from `<data_dir>/.filePartsLoader`, or
    /// starts empty if the file doesn't exist yet.
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = data_dir.as_ref().join(MANIFEST_FILE_NAME);
        let inner = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => ManifestFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(ManifestTable {
            path,
            inner: Mutex::new(inner),
        })
    }

    pub fn get(&self, basename: &str) -> Option<Vec<String>> {
        self.inner
            .lock()
            .expect("manifest table poisoned")
            .files
            .get(basename)
            .cloned()
    }

    /// Inserts or replaces the entry for `basename` and persists the whole
    /// table before returning, so an upload is never reported complete
    /// before its manifest entry is durable.
    pub fn put(&self, basename: &str, digests: Vec<String>) -> Result<(), ManifestError> {
        let mut guard = self.inner.lock().expect("manifest table poisoned");
        guard.files.insert(basename.to_string(), digests);
        self.persist(&guard)
    }

    /// Removes `basename`'s entry. A no-op if it wasn't present.
    pub fn remove(&self, basename: &str) -> Result<(), ManifestError> {
        let mut guard = self.inner.lock().expect("manifest table poisoned");
        guard.files.remove(basename);
        self.persist(&guard)
    }

    fn persist(&self, file: &ManifestFile) -> Result<(), ManifestError> {
        let tmp_path = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(file)?;
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let table = ManifestTable::load(dir.path()).unwrap();
            table
                .put("order-book", vec!["aa".into(), "bb".into()])
                .unwrap();
        }
        let reloaded = ManifestTable::load(dir.path()).unwrap();
        assert_eq!(
            reloaded.get("order-book"),
            Some(vec!["aa".to_string(), "bb".to_string()])
        );
    }

    #[test]
    fn remove_drops_entry() {
        let dir = tempfile::tempdir().unwrap();
        let table = ManifestTable::load(dir.path()).unwrap();
        table.put("f", vec!["x".into()]).unwrap();
        table.remove("f").unwrap();
        assert_eq!(table.get("f"), None);
    }

    #[test]
    fn missing_basename_removal_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let table = ManifestTable::load(dir.path()).unwrap();
        assert!(table.remove("never-existed").is_ok());
    }
}
