//! Collaborator seams
//!
//! Registry transport (HTTP, OCI, credentials) and chart content parsing
//! are deliberately outside this crate. The resolver drives them through
//! these two traits and treats their results as opaque.

use async_trait::async_trait;
use std::path::Path;

use charthaul_core::Chart;

use crate::error::Result;
use crate::handle::ArtifactHandle;

/// Repository client: fetches one chart artifact by name, source, and version
///
/// Called at most once per distinct `(name, repository, version)` triple
/// encountered during tree resolution; cache hits never reach the client.
/// A successful pull materializes the artifact on disk (conventionally at
/// the cache path for its key, so later invocations hit the cache) and
/// returns a handle to either a packed archive or an extracted directory.
#[async_trait]
pub trait RepoClient: Send + Sync {
    async fn pull(&self, name: &str, repository: &str, version: &str) -> Result<ArtifactHandle>;
}

/// Chart loader: parses an extracted chart directory into a [`Chart`]
///
/// The loader owns metadata parsing, template collection, and attaching any
/// vendored subcharts it finds. The resolver never inspects chart content.
pub trait ChartLoader: Send + Sync {
    fn load(&self, path: &Path) -> charthaul_core::Result<Chart>;
}
