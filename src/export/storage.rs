//! Persistent storage backends addressed by disk name
//!
//! A backend only has to accept whole files: `put(path, bytes)` answers
//! whether the object was stored.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};

/// Name of the disk used when none is given
pub const DEFAULT_DISK: &str = "local";

/// Persistent storage backend
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `contents` at `path`, returning whether the write succeeded
    async fn put(&self, path: &str, contents: Vec<u8>) -> bool;
}

/// Backend writing files below a root directory
#[derive(Debug, Clone)]
pub struct LocalDisk {
    root: PathBuf,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative object path below the root.
    ///
    /// Absolute paths and `..` components are refused.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || path.is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl StorageBackend for LocalDisk {
    async fn put(&self, path: &str, contents: Vec<u8>) -> bool {
        let Some(target) = self.resolve(path) else {
            warn!("Refusing to store outside disk root: {}", path);
            return false;
        };

        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("Failed to create {}: {}", parent.display(), e);
                return false;
            }
        }

        match tokio::fs::write(&target, &contents).await {
            Ok(()) => {
                debug!("Stored {} bytes at {}", contents.len(), target.display());
                true
            }
            Err(e) => {
                warn!("Failed to write {}: {}", target.display(), e);
                false
            }
        }
    }
}

/// In-memory backend, handy for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryDisk {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    reject: bool,
}

impl MemoryDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// A disk whose `put` always fails
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(path).cloned())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageBackend for MemoryDisk {
    async fn put(&self, path: &str, contents: Vec<u8>) -> bool {
        if self.reject {
            return false;
        }
        match self.objects.lock() {
            Ok(mut objects) => {
                objects.insert(path.to_string(), contents);
                true
            }
            Err(_) => false,
        }
    }
}

/// Named storage disks
#[derive(Clone, Default)]
pub struct StorageManager {
    disks: HashMap<String, Arc<dyn StorageBackend>>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build local disks from configuration
    pub fn from_config(config: &StorageConfig) -> Self {
        let mut manager = Self::new();
        for (name, disk) in &config.disks {
            manager.register(name.clone(), Arc::new(LocalDisk::new(&disk.root)));
        }
        manager
    }

    /// Register (or replace) a disk
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn StorageBackend>) {
        self.disks.insert(name.into(), backend);
    }

    /// Look up a disk by name
    pub fn disk(&self, name: &str) -> Result<Arc<dyn StorageBackend>> {
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::DiskNotFound(name.to_string()).into())
    }

    /// Names of all registered disks, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.disks.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("disks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_disk_put() {
        let dir = tempdir().unwrap();
        let disk = LocalDisk::new(dir.path());

        assert!(disk.put("reports/2024/users.csv", b"id\n1\n".to_vec()).await);
        let stored = std::fs::read(dir.path().join("reports/2024/users.csv")).unwrap();
        assert_eq!(stored, b"id\n1\n");
    }

    #[tokio::test]
    async fn test_local_disk_refuses_escape() {
        let dir = tempdir().unwrap();
        let disk = LocalDisk::new(dir.path());

        assert!(!disk.put("../outside.csv", b"x".to_vec()).await);
        assert!(!disk.put("/etc/outside.csv", b"x".to_vec()).await);
        assert!(!disk.put("", b"x".to_vec()).await);
    }

    #[tokio::test]
    async fn test_memory_disk() {
        let disk = MemoryDisk::new();
        assert!(disk.put("a.csv", b"1".to_vec()).await);
        assert_eq!(disk.get("a.csv"), Some(b"1".to_vec()));

        let rejecting = MemoryDisk::rejecting();
        assert!(!rejecting.put("a.csv", b"1".to_vec()).await);
        assert!(rejecting.is_empty());
    }

    #[test]
    fn test_manager_lookup() {
        let mut manager = StorageManager::new();
        manager.register("memory", Arc::new(MemoryDisk::new()));

        assert!(manager.disk("memory").is_ok());
        assert!(matches!(
            manager.disk("s3"),
            Err(ExportError::Storage(StorageError::DiskNotFound(_)))
        ));
        assert_eq!(manager.names(), vec!["memory".to_string()]);
    }
}
