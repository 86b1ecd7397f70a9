//! File operations facade.
//!
//! Uploads, deletes and serving all go through [`FileService`], which keeps
//! the filesystem and the metadata table in step.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use super::metadata::MetadataStore;
use super::path::{is_within_root, join_relative, sanitize_upload_path, validate_relative};
use super::snapshot::StorageSnapshot;
use super::walker::{FileEntry, StorageWalker};
use super::PARTIAL_SUFFIX;
use crate::config::{ConflictPolicy, StorageConfig};
use crate::datetime::now_timestamp;
use crate::{FiledropError, Result};

/// One file part of an upload request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Client-supplied name, possibly with `/`-separated directories.
    pub name: String,
    /// File content.
    pub content: Vec<u8>,
}

impl UploadFile {
    /// Create a new upload part.
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A file that could not be saved.
#[derive(Debug)]
pub struct UploadFailure {
    /// Name as sent by the client.
    pub name: String,
    pub error: FiledropError,
}

/// Outcome of a multi-file upload.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Final relative paths of the saved files, in request order.
    pub uploaded: Vec<String>,
    pub failed: Vec<UploadFailure>,
    /// Parts with an empty file name.
    pub skipped: usize,
}

impl UploadReport {
    /// Check if every non-empty part was saved.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Whether any failure was caused by the server rather than the client's input.
    pub fn has_server_failure(&self) -> bool {
        self.failed.iter().any(|f| !f.error.is_client_error())
    }
}

/// What a delete removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletedKind {
    File,
    Directory,
}

/// A file resolved for download.
#[derive(Debug, Clone)]
pub struct ServedFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// MIME type guessed from the extension.
    pub content_type: mime_guess::Mime,
    /// Last path segment, for `Content-Disposition`.
    pub file_name: String,
}

/// An upload whose content is being written to a hidden partial file.
///
/// Dropping it before [`FileService::finish_upload`] removes the partial file.
#[derive(Debug)]
pub struct PendingUpload {
    rel: String,
    partial: PathBuf,
    committed: bool,
}

impl PendingUpload {
    /// Sanitized relative path the upload was requested under.
    pub fn rel(&self) -> &str {
        &self.rel
    }

    /// Where the content must be written before finishing.
    pub fn partial_path(&self) -> &Path {
        &self.partial
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.partial);
        }
    }
}

/// Orchestrates storage mutations and metadata updates.
#[derive(Debug)]
pub struct FileService {
    root: PathBuf,
    policy: ConflictPolicy,
    metadata: MetadataStore,
    walker: StorageWalker,
    /// Serializes choosing a final name and moving the file there.
    placement: Mutex<()>,
}

impl FileService {
    /// Open the upload root described by `config`, creating it if needed.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let root = PathBuf::from(&config.upload_root);
        fs::create_dir_all(&root)
            .map_err(|e| FiledropError::file(root.display().to_string(), e))?;

        let metadata = MetadataStore::open(&root, &config.metadata_file)?;
        let walker = StorageWalker::new(&root, metadata.reserved_names());

        Ok(Self {
            root,
            policy: config.conflict_policy,
            metadata,
            walker,
            placement: Mutex::new(()),
        })
    }

    /// Get the upload root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the conflict policy.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Get the metadata store.
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Save every part independently.
    ///
    /// Parts with an empty name are skipped. A failing part does not undo the
    /// parts saved before it.
    pub fn upload(&self, files: Vec<UploadFile>) -> UploadReport {
        let mut report = UploadReport::default();

        for file in files {
            if file.name.trim().is_empty() {
                report.skipped += 1;
                continue;
            }
            match self.upload_one(&file.name, &file.content) {
                Ok(path) => report.uploaded.push(path),
                Err(error) => {
                    tracing::warn!(name = %file.name, error = %error, "Upload failed");
                    report.failed.push(UploadFailure {
                        name: file.name,
                        error,
                    });
                }
            }
        }

        report
    }

    /// Save one file and record its timestamp. Returns the final relative path.
    pub fn upload_one(&self, name: &str, content: &[u8]) -> Result<String> {
        let pending = self.begin_upload(name)?;
        fs::write(pending.partial_path(), content)
            .map_err(|e| FiledropError::file(pending.rel(), e))?;
        self.finish_upload(pending)
    }

    /// Validate an upload name and prepare the partial file it is written to.
    ///
    /// Missing parent directories are created one segment at a time, each
    /// checked against the upload root before anything is created under it.
    pub fn begin_upload(&self, name: &str) -> Result<PendingUpload> {
        let rel = sanitize_upload_path(name)?;
        if self.metadata.is_reserved(&rel) {
            return Err(FiledropError::InvalidPath(format!(
                "{rel} is a reserved name"
            )));
        }

        let parent_rel = rel.rsplit_once('/').map_or("", |(dir, _)| dir);
        let parent = self.ensure_dir(parent_rel)?;
        if !is_within_root(&self.root, &parent)? {
            return Err(FiledropError::InvalidPath(format!(
                "{parent_rel} resolves outside the upload root"
            )));
        }

        let partial = parent.join(format!(".{}{PARTIAL_SUFFIX}", Uuid::new_v4().simple()));
        Ok(PendingUpload {
            rel,
            partial,
            committed: false,
        })
    }

    /// Move a fully written upload to its final name and record its timestamp.
    ///
    /// The final name is chosen, the file renamed and the timestamp recorded
    /// under one lock, so a concurrent upload of the same name cannot slip
    /// between the move and the metadata write.
    pub fn finish_upload(&self, mut pending: PendingUpload) -> Result<String> {
        let bytes = fs::metadata(&pending.partial).map_or(0, |m| m.len());

        let _guard = self
            .placement
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let final_rel = match self.policy {
            ConflictPolicy::Overwrite => {
                let target = join_relative(&self.root, &pending.rel);
                if target.symlink_metadata().is_ok_and(|m| m.is_dir()) {
                    return Err(FiledropError::Validation(format!(
                        "{} is an existing directory",
                        pending.rel
                    )));
                }
                pending.rel.clone()
            }
            ConflictPolicy::Rename => self.free_name(&pending.rel),
        };

        fs::rename(&pending.partial, join_relative(&self.root, &final_rel))
            .map_err(|e| FiledropError::file(final_rel.clone(), e))?;
        pending.committed = true;

        self.metadata.record(&final_rel, &now_timestamp())?;
        tracing::info!(path = %final_rel, bytes, "File uploaded");
        Ok(final_rel)
    }

    /// Create `dir_rel` under the root segment by segment.
    ///
    /// Symlinked segments must resolve inside the root. A segment that is an
    /// existing file is a client error.
    fn ensure_dir(&self, dir_rel: &str) -> Result<PathBuf> {
        let mut dir = self.root.clone();
        let mut walked = String::new();

        for segment in dir_rel.split('/').filter(|s| !s.is_empty()) {
            dir.push(segment);
            if !walked.is_empty() {
                walked.push('/');
            }
            walked.push_str(segment);

            match dir.symlink_metadata() {
                Ok(meta) if meta.file_type().is_symlink() => {
                    if !dir.exists() {
                        return Err(FiledropError::Validation(format!(
                            "{walked} is a broken link"
                        )));
                    }
                    if !is_within_root(&self.root, &dir)? {
                        return Err(FiledropError::InvalidPath(format!(
                            "{walked} resolves outside the upload root"
                        )));
                    }
                    if !dir.is_dir() {
                        return Err(FiledropError::Validation(format!(
                            "{walked} is an existing file"
                        )));
                    }
                }
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    return Err(FiledropError::Validation(format!(
                        "{walked} is an existing file"
                    )))
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::create_dir(&dir) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
                    Err(e) => return Err(FiledropError::file(walked, e)),
                },
                Err(e) => return Err(FiledropError::file(walked, e)),
            }
        }

        Ok(dir)
    }

    /// First of `rel`, `stem_1.ext`, `stem_2.ext`, ... that does not exist.
    fn free_name(&self, rel: &str) -> String {
        let taken = |candidate: &str| {
            join_relative(&self.root, candidate)
                .symlink_metadata()
                .is_ok()
                || self.metadata.is_reserved(candidate)
        };
        if !taken(rel) {
            return rel.to_string();
        }

        let (dir, file) = match rel.rsplit_once('/') {
            Some((dir, file)) => (format!("{dir}/"), file),
            None => (String::new(), rel),
        };
        let (stem, ext) = match file.rfind('.') {
            Some(idx) if idx > 0 => file.split_at(idx),
            _ => (file, ""),
        };

        (1u64..)
            .map(|n| format!("{dir}{stem}_{n}{ext}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| rel.to_string())
    }

    /// Delete a file or directory (recursively) and its metadata.
    pub fn delete(&self, raw: &str) -> Result<DeletedKind> {
        let rel = validate_relative(raw)?;
        if self.metadata.is_reserved(&rel) {
            return Err(FiledropError::NotFound(rel));
        }

        let target = join_relative(&self.root, &rel);
        let meta = match target.symlink_metadata() {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FiledropError::NotFound(rel))
            }
            Err(e) => return Err(FiledropError::file(rel, e)),
        };

        if let Some(parent) = target.parent() {
            if !is_within_root(&self.root, parent)? {
                return Err(FiledropError::InvalidPath(format!(
                    "{rel} resolves outside the upload root"
                )));
            }
        }

        if meta.is_dir() {
            fs::remove_dir_all(&target).map_err(|e| FiledropError::file(rel.clone(), e))?;
            let removed = self.metadata.remove_under(&rel)?;
            tracing::info!(path = %rel, metadata_removed = removed, "Directory deleted");
            Ok(DeletedKind::Directory)
        } else {
            fs::remove_file(&target).map_err(|e| FiledropError::file(rel.clone(), e))?;
            self.metadata.remove(&rel)?;
            tracing::info!(path = %rel, "File deleted");
            Ok(DeletedKind::File)
        }
    }

    /// Resolve a relative path to a regular file inside the upload root.
    pub fn resolve_for_serving(&self, raw: &str) -> Result<ServedFile> {
        let rel = validate_relative(raw)?;
        if self.metadata.is_reserved(&rel) || rel.ends_with(PARTIAL_SUFFIX) {
            return Err(FiledropError::NotFound(rel));
        }

        let target = join_relative(&self.root, &rel);
        let meta = match fs::metadata(&target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FiledropError::NotFound(rel))
            }
            Err(e) => return Err(FiledropError::file(rel, e)),
        };
        if !meta.is_file() {
            return Err(FiledropError::NotFound(rel));
        }
        if !is_within_root(&self.root, &target)? {
            tracing::warn!(path = %rel, "Refusing to serve file outside the upload root");
            return Err(FiledropError::NotFound(rel));
        }

        let content_type = mime_guess::from_path(&target).first_or_octet_stream();
        let file_name = rel.rsplit('/').next().unwrap_or(&rel).to_string();

        Ok(ServedFile {
            path: target,
            content_type,
            file_name,
        })
    }

    /// Current listing, newest uploads first.
    pub fn list(&self) -> Result<Vec<FileEntry>> {
        self.walker.list(&self.metadata.snapshot())
    }

    /// Live capacity of the volume holding the upload root.
    pub fn snapshot(&self) -> Result<StorageSnapshot> {
        StorageSnapshot::for_path(&self.root)
    }
}
