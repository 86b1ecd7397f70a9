//! Recursive enumeration of the upload root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::metadata::MetadataTable;
use super::PARTIAL_SUFFIX;
use crate::{FiledropError, Result};

/// Bytes per megabyte, for size labels.
const MB: f64 = 1024.0 * 1024.0;

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One file or directory under the upload root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Path relative to the upload root, `/`-separated.
    pub path: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes; `None` for directories.
    pub size: Option<u64>,
    /// Recorded upload timestamp, if any.
    pub uploaded_at: Option<String>,
}

impl FileEntry {
    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// `"directory"` for directories, size in MB with two decimals for files.
    pub fn size_label(&self) -> String {
        match (self.kind, self.size) {
            (EntryKind::File, Some(bytes)) => format!("{:.2} MB", bytes as f64 / MB),
            (EntryKind::File, None) => format!("{:.2} MB", 0.0),
            (EntryKind::Directory, _) => "directory".to_string(),
        }
    }

    /// Name shown for this entry: the last path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Walks the upload root and builds listings.
#[derive(Debug, Clone)]
pub struct StorageWalker {
    root: PathBuf,
    /// Root-level names that are never listed.
    reserved: Vec<String>,
}

impl StorageWalker {
    /// Create a walker over `root` that hides the given root-level names.
    pub fn new(root: impl Into<PathBuf>, reserved: impl IntoIterator<Item = String>) -> Self {
        Self {
            root: root.into(),
            reserved: reserved.into_iter().collect(),
        }
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every directory and regular file under the root, top-down.
    ///
    /// Within one directory its subdirectories come first, then its files,
    /// each group ordered by name; then each subdirectory is descended into.
    /// Symlinks are skipped. A missing root yields an empty listing.
    pub fn walk(&self) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(entries),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(FiledropError::file(".", e)),
        }
        self.walk_dir(&self.root, "", &mut entries)?;
        Ok(entries)
    }

    /// [`walk`](Self::walk), annotated with timestamps from `table` and sorted
    /// newest first. Entries without a timestamp keep their walk order at the end.
    pub fn list(&self, table: &MetadataTable) -> Result<Vec<FileEntry>> {
        let mut entries = self.walk()?;
        for entry in &mut entries {
            entry.uploaded_at = table.get(&entry.path).cloned();
        }
        entries.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(entries)
    }

    /// Entries deleted while the walk is running are skipped, not reported.
    fn walk_dir(&self, dir: &Path, rel: &str, out: &mut Vec<FileEntry>) -> Result<()> {
        let dir_label = if rel.is_empty() { "." } else { rel };
        let read = match fs::read_dir(dir) {
            Ok(read) => read,
            Err(e) if vanished(&e) && !rel.is_empty() => return Ok(()),
            Err(e) => return Err(FiledropError::file(dir_label, e)),
        };

        let mut dirs = Vec::new();
        let mut files = Vec::new();

        for entry in read {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if vanished(&e) => continue,
                Err(e) => return Err(FiledropError::file(dir_label, e)),
            };
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(dir = %dir_label, "Skipping entry with non UTF-8 name");
                continue;
            };
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) if vanished(&e) => continue,
                Err(e) => return Err(FiledropError::file(join(rel, &name), e)),
            };

            if file_type.is_dir() {
                dirs.push(name);
            } else if file_type.is_file() {
                if rel.is_empty() && self.reserved.contains(&name) {
                    continue;
                }
                if name.ends_with(PARTIAL_SUFFIX) {
                    continue;
                }
                let size = match entry.metadata() {
                    Ok(meta) => meta.len(),
                    Err(e) if vanished(&e) => continue,
                    Err(e) => return Err(FiledropError::file(join(rel, &name), e)),
                };
                files.push((name, size));
            }
        }

        dirs.sort();
        files.sort();

        for name in &dirs {
            out.push(FileEntry {
                path: join(rel, name),
                kind: EntryKind::Directory,
                size: None,
                uploaded_at: None,
            });
        }
        for (name, size) in files {
            out.push(FileEntry {
                path: join(rel, &name),
                kind: EntryKind::File,
                size: Some(size),
                uploaded_at: None,
            });
        }
        for name in &dirs {
            let child_rel = join(rel, name);
            self.walk_dir(&dir.join(name), &child_rel, out)?;
        }

        Ok(())
    }
}

/// The entry was removed between being listed and being inspected.
fn vanished(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound
}

fn join(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_string()
    } else {
        format!("{rel}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn walker(dir: &TempDir) -> StorageWalker {
        StorageWalker::new(
            dir.path(),
            ["metadata.json".to_string(), "metadata.json.tmp".to_string()],
        )
    }

    fn paths(entries: &[FileEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let walker = StorageWalker::new(temp_dir.path().join("nope"), Vec::new());
        assert!(walker.walk().unwrap().is_empty());
        assert!(walker.list(&MetadataTable::new()).unwrap().is_empty());
    }

    #[test]
    fn test_walk_order_and_kinds() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::create_dir(root.join("a")).unwrap();
        fs::write(root.join("z.txt"), b"zz").unwrap();
        fs::write(root.join("b/file.txt"), b"hello").unwrap();

        let entries = walker(&temp_dir).walk().unwrap();
        assert_eq!(
            paths(&entries),
            vec!["a", "b", "z.txt", "b/inner", "b/file.txt"]
        );

        let b = entries.iter().find(|e| e.path == "b").unwrap();
        assert!(b.is_dir());
        assert_eq!(b.size, None);

        let file = entries.iter().find(|e| e.path == "b/file.txt").unwrap();
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.size, Some(5));
        assert_eq!(file.file_name(), "file.txt");
    }

    #[test]
    fn test_empty_directory_is_listed() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("empty")).unwrap();

        let entries = walker(&temp_dir).walk().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_dir());
    }

    #[test]
    fn test_metadata_file_is_hidden() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("metadata.json"), b"{}").unwrap();
        fs::write(root.join("metadata.json.tmp"), b"{}").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        // Only the root-level backing file is reserved.
        fs::write(root.join("sub/metadata.json"), b"user data").unwrap();

        let entries = walker(&temp_dir).walk().unwrap();
        assert_eq!(paths(&entries), vec!["sub", "sub/metadata.json"]);
    }

    #[test]
    fn test_partial_uploads_are_hidden() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(format!("a.txt.1234{PARTIAL_SUFFIX}")),
            b"half",
        )
        .unwrap();
        assert!(walker(&temp_dir).walk().unwrap().is_empty());
    }

    #[test]
    fn test_vanished_subdirectory_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let walker = walker(&temp_dir);

        let mut entries = Vec::new();
        walker
            .walk_dir(&temp_dir.path().join("gone"), "gone", &mut entries)
            .unwrap();
        assert!(entries.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), b"s").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("link")).unwrap();

        assert!(walker(&temp_dir).walk().unwrap().is_empty());
    }

    #[test]
    fn test_list_sorts_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["one.txt", "two.txt", "three.txt", "stray.txt"] {
            fs::write(root.join(name), b"x").unwrap();
        }
        fs::create_dir(root.join("dir")).unwrap();

        let mut table = MetadataTable::new();
        table.insert("one.txt".into(), "2024-01-01T00:00:00.000000Z".into());
        table.insert("two.txt".into(), "2024-01-02T00:00:00.000000Z".into());
        table.insert("three.txt".into(), "2024-01-03T00:00:00.000000Z".into());

        let entries = walker(&temp_dir).list(&table).unwrap();
        assert_eq!(
            paths(&entries),
            vec!["three.txt", "two.txt", "one.txt", "dir", "stray.txt"]
        );
        assert_eq!(
            entries[0].uploaded_at.as_deref(),
            Some("2024-01-03T00:00:00.000000Z")
        );
        assert!(entries[4].uploaded_at.is_none());
    }

    #[test]
    fn test_size_label() {
        let file = FileEntry {
            path: "a.bin".into(),
            kind: EntryKind::File,
            size: Some(1024 * 1024 * 3 / 2),
            uploaded_at: None,
        };
        assert_eq!(file.size_label(), "1.50 MB");

        let small = FileEntry {
            size: Some(2),
            ..file.clone()
        };
        assert_eq!(small.size_label(), "0.00 MB");

        let dir = FileEntry {
            kind: EntryKind::Directory,
            size: None,
            ..file
        };
        assert_eq!(dir.size_label(), "directory");
    }
}
