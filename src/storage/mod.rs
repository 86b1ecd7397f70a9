//! Upload storage for filedrop.
//!
//! This module provides everything below the HTTP layer:
//! - Path sanitization and traversal checks
//! - The persisted upload-timestamp table
//! - Recursive listing of the upload root
//! - Volume capacity snapshots
//! - The [`FileService`] facade used by request handlers

mod metadata;
pub mod path;
mod service;
mod snapshot;
mod walker;

pub use metadata::{MetadataStore, MetadataTable};
pub use service::{
    DeletedKind, FileService, PendingUpload, ServedFile, UploadFailure, UploadFile, UploadReport,
};
pub use snapshot::StorageSnapshot;
pub use walker::{EntryKind, FileEntry, StorageWalker};

/// Suffix of in-progress upload files. They are never listed or served.
pub const PARTIAL_SUFFIX: &str = ".filedrop-partial";
