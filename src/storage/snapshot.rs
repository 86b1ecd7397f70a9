//! Live capacity figures for the volume holding the upload root.

use std::path::Path;

use serde::Serialize;
use sysinfo::Disks;

use crate::{FiledropError, Result};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Total, used and free bytes of one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageSnapshot {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

impl StorageSnapshot {
    /// Build a snapshot from total and available bytes.
    pub fn new(total: u64, free: u64) -> Self {
        Self {
            total,
            used: total.saturating_sub(free),
            free,
        }
    }

    /// Query the volume that contains `path`.
    ///
    /// The disk whose mount point is the longest prefix of the canonical path
    /// wins. Nothing is cached; every call refreshes the disk list.
    pub fn for_path(path: &Path) -> Result<Self> {
        let canonical = path
            .canonicalize()
            .map_err(|e| FiledropError::Storage(format!("{}: {e}", path.display())))?;

        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .filter(|disk| canonical.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().components().count())
            .ok_or_else(|| {
                FiledropError::Storage(format!("no volume found for {}", canonical.display()))
            })?;

        Ok(Self::new(disk.total_space(), disk.available_space()))
    }

    pub fn total_gb(&self) -> f64 {
        self.total as f64 / GB
    }

    pub fn used_gb(&self) -> f64 {
        self.used as f64 / GB
    }

    pub fn free_gb(&self) -> f64 {
        self.free as f64 / GB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_is_total_minus_free() {
        let snapshot = StorageSnapshot::new(100, 30);
        assert_eq!(snapshot.used, 70);
        assert_eq!(snapshot.free, 30);
    }

    #[test]
    fn test_free_larger_than_total_saturates() {
        let snapshot = StorageSnapshot::new(10, 20);
        assert_eq!(snapshot.used, 0);
    }

    #[test]
    fn test_gb_figures() {
        let gb = 1024 * 1024 * 1024;
        let snapshot = StorageSnapshot::new(4 * gb, gb);
        assert_eq!(snapshot.total_gb(), 4.0);
        assert_eq!(snapshot.used_gb(), 3.0);
        assert_eq!(snapshot.free_gb(), 1.0);
    }

    #[test]
    fn test_missing_path_is_storage_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let result = StorageSnapshot::for_path(&temp_dir.path().join("missing"));
        assert!(matches!(result, Err(FiledropError::Storage(_))));
    }
}
