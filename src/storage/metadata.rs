//! Upload timestamp metadata.
//!
//! One JSON object at `<upload_root>/<metadata_file>` maps relative paths to
//! the UTC timestamp of their last upload. The store keeps the table cached in
//! memory behind a mutex; every mutation persists the whole table before the
//! cache is updated.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{FiledropError, Result};

/// Relative path to ISO-8601 UTC timestamp.
pub type MetadataTable = BTreeMap<String, String>;

/// Suffix of the temporary file written before the atomic rename.
const TMP_SUFFIX: &str = ".tmp";

/// Persistent, mutex-guarded metadata table.
#[derive(Debug)]
pub struct MetadataStore {
    /// Absolute path of the backing file.
    path: PathBuf,
    /// Absolute path of the temporary sibling.
    tmp_path: PathBuf,
    /// Backing file name relative to the upload root.
    file_name: String,
    /// In-memory copy of the persisted table.
    cache: Mutex<MetadataTable>,
}

impl MetadataStore {
    /// Open the store for `file_name` inside `root`, loading the current table.
    ///
    /// A missing backing file yields an empty table. A backing file that is
    /// not a JSON object of strings is an error.
    pub fn open(root: impl AsRef<Path>, file_name: &str) -> Result<Self> {
        let root = root.as_ref();
        let tmp_name = format!("{file_name}{TMP_SUFFIX}");
        let store = Self {
            path: root.join(file_name),
            tmp_path: root.join(tmp_name),
            file_name: file_name.to_string(),
            cache: Mutex::new(MetadataTable::new()),
        };

        let table = store.load()?;
        *store.lock() = table;
        Ok(store)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names under the upload root that belong to the store itself.
    pub fn reserved_names(&self) -> [String; 2] {
        [
            self.file_name.clone(),
            format!("{}{TMP_SUFFIX}", self.file_name),
        ]
    }

    /// Whether `rel_path` names the backing file or its temporary sibling.
    pub fn is_reserved(&self, rel_path: &str) -> bool {
        let rel_path = rel_path.trim_start_matches("./");
        rel_path == self.file_name
            || rel_path
                .strip_prefix(self.file_name.as_str())
                .is_some_and(|rest| rest == TMP_SUFFIX)
    }

    /// Read the persisted table from disk.
    pub fn load(&self) -> Result<MetadataTable> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MetadataTable::new()),
            Err(e) => return Err(FiledropError::file(self.file_name.clone(), e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(MetadataTable::new());
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Replace the persisted table and the cache with `table`.
    pub fn save(&self, table: &MetadataTable) -> Result<()> {
        let mut cache = self.lock();
        self.persist(table)?;
        *cache = table.clone();
        Ok(())
    }

    /// Set the timestamp of `path`, inserting it if needed.
    pub fn record(&self, path: &str, timestamp: &str) -> Result<()> {
        self.mutate(|table| {
            table.insert(path.to_string(), timestamp.to_string());
        })
    }

    /// Remove the entry for `path`. Returns whether it existed.
    pub fn remove(&self, path: &str) -> Result<bool> {
        self.mutate(|table| table.remove(path).is_some())
    }

    /// Remove `dir` and every entry nested under `dir/`. Returns the count removed.
    pub fn remove_under(&self, dir: &str) -> Result<usize> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let dir = dir.trim_end_matches('/');
        self.mutate(|table| {
            let before = table.len();
            table.retain(|key, _| key != dir && !key.starts_with(&prefix));
            before - table.len()
        })
    }

    /// Timestamp recorded for `path`.
    pub fn get(&self, path: &str) -> Option<String> {
        self.lock().get(path).cloned()
    }

    /// Copy of the cached table.
    pub fn snapshot(&self) -> MetadataTable {
        self.lock().clone()
    }

    /// Apply `f` to a copy of the table, persist it if it changed, then swap it in.
    fn mutate<R>(&self, f: impl FnOnce(&mut MetadataTable) -> R) -> Result<R> {
        let mut cache = self.lock();
        let mut next = cache.clone();
        let out = f(&mut next);

        if next != *cache {
            self.persist(&next)?;
            *cache = next;
        }
        Ok(out)
    }

    /// Write `table` to the temporary sibling, sync it, and rename it into place.
    fn persist(&self, table: &MetadataTable) -> Result<()> {
        let json = serde_json::to_vec_pretty(table)?;
        let tmp_name = format!("{}{TMP_SUFFIX}", self.file_name);

        let write = || -> io::Result<()> {
            let mut file = File::create(&self.tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(FiledropError::file(tmp_name, e));
        }

        fs::rename(&self.tmp_path, &self.path)
            .map_err(|e| FiledropError::file(self.file_name.clone(), e))
    }

    fn lock(&self) -> MutexGuard<'_, MetadataTable> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
