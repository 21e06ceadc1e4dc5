//! Fetched artifact handles

use std::path::{Path, PathBuf};

use charthaul_core::extract::{extract_archive, ExtractOptions, ExtractedDir};

/// What a handle's path points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// An already-expanded chart directory
    Directory,
    /// A packed `.tar.gz` archive file
    Archive,
}

/// One fetched chart artifact
///
/// Produced by the repository client on a successful pull, or synthesized
/// from a cache hit. `extract` and the resolver's load path are independent
/// and idempotent with respect to the underlying files.
#[derive(Debug, Clone)]
pub struct ArtifactHandle {
    /// Chart name
    pub name: String,

    /// Repository source used to fetch this chart and its dependencies
    pub repository: String,

    /// Absolute on-disk location of the artifact
    pub path: PathBuf,

    /// Whether the path is a packed archive or an extracted directory
    pub kind: ArtifactKind,
}

impl ArtifactHandle {
    /// Handle over an already-extracted chart directory
    pub fn directory(
        name: impl Into<String>,
        repository: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            path: path.into(),
            kind: ArtifactKind::Directory,
        }
    }

    /// Handle over a packed chart archive
    pub fn archive(
        name: impl Into<String>,
        repository: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            path: path.into(),
            kind: ArtifactKind::Archive,
        }
    }

    /// Handle over a materialized cache entry, inferring the kind on disk
    pub fn from_cached_path(
        name: impl Into<String>,
        repository: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        let path = path.into();
        let kind = if path.is_dir() {
            ArtifactKind::Directory
        } else {
            ArtifactKind::Archive
        };
        Self {
            name: name.into(),
            repository: repository.into(),
            path,
            kind,
        }
    }

    /// Produce a usable chart directory
    ///
    /// For a `Directory` handle this is the cache-hit fast path: no IO, and
    /// the returned handle's cleanup is a no-op since the cache owns the
    /// directory. For an `Archive` handle the packed file is extracted into
    /// fresh temporary space owned by the returned [`ExtractedDir`].
    pub fn extract(&self, opts: &ExtractOptions) -> charthaul_core::Result<ExtractedDir> {
        match self.kind {
            ArtifactKind::Directory => Ok(ExtractedDir::retained(&self.path)),
            ArtifactKind::Archive => extract_archive(&self.path, opts),
        }
    }

    /// Artifact location on disk
    pub fn path(&self) -> &Path {
        &self.path
    }
}
