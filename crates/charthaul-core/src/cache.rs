//! On-disk artifact cache
//!
//! A flat directory of cached chart artifacts, one entry per fetched
//! `(chart, project, url, version)` tuple, named by the reversible key
//! encoding from [`crate::key`]. Path allocation is pure computation;
//! only construction and scans touch the filesystem. The layout is a
//! durable contract: any process pointed at the same root reconstructs
//! the index by listing the directory.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{CoreError, Result};
use crate::key::CacheKey;

/// Stateless path allocator over a cache root directory
pub struct ArtifactCache {
    root: PathBuf,
    // Keeps an in-process scan consistent against concurrent removals
    // issued through this same handle. The filesystem itself needs no
    // locking: entry paths are unique per key.
    scan_lock: RwLock<()>,
}

impl ArtifactCache {
    /// Open the cache at `root`, creating the directory if absent
    ///
    /// The root is created with mode `0700`: cache contents can embed
    /// private repository URLs in entry names.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.is_dir() {
            create_private_dir(&root).map_err(|e| CoreError::CacheInit {
                path: root.display().to_string(),
                message: e.to_string(),
            })?;
        }

        Ok(Self {
            root,
            scan_lock: RwLock::new(()),
        })
    }

    /// Open the cache at the default per-user location
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_root()?)
    }

    /// Default cache root under the platform cache directory
    pub fn default_root() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir().ok_or_else(|| CoreError::CacheInit {
            path: String::new(),
            message: "could not determine platform cache directory".to_string(),
        })?;
        Ok(cache_dir.join("charthaul").join("charts"))
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the entry path for a key
    ///
    /// Pure computation: performs no IO and does not imply the artifact
    /// exists. The same key always yields the same path.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.encode())
    }

    /// Return the entry path if the artifact has been materialized
    ///
    /// This is the hit/miss check callers use before a network fetch.
    pub fn path_if_exists(&self, key: &CacheKey) -> Option<PathBuf> {
        let _guard = self.scan_lock.read().unwrap_or_else(|e| e.into_inner());
        let path = self.path_for(key);
        path.exists().then_some(path)
    }

    /// Scan the cache root and decode every entry back into its key
    ///
    /// Entries whose names this codec did not produce are logged and
    /// skipped, not fatal: a corrupt or foreign file must not take the
    /// whole cache down.
    pub fn list(&self) -> Result<Vec<(CacheKey, PathBuf)>> {
        let _guard = self.scan_lock.read().unwrap_or_else(|e| e.into_inner());

        let mut entries = Vec::new();
        for dirent in std::fs::read_dir(&self.root)? {
            let dirent = dirent?;
            let name = dirent.file_name().to_string_lossy().to_string();
            match CacheKey::decode(&name) {
                Ok(key) => entries.push((key, dirent.path())),
                Err(_) => {
                    tracing::warn!("Skipping unrecognized cache entry: {}", name);
                }
            }
        }
        Ok(entries)
    }

    /// Remove a single cache entry, if present
    pub fn remove(&self, key: &CacheKey) -> Result<()> {
        let _guard = self.scan_lock.write().unwrap_or_else(|e| e.into_inner());
        let path = self.path_for(key);
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Remove every decodable entry from the cache
    ///
    /// Foreign files in the root are left untouched.
    pub fn clear(&self) -> Result<()> {
        for (key, _) in self.list()? {
            self.remove(&key)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}
