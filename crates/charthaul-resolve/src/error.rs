//! Error types for dependency resolution

use charthaul_core::CoreError;
use thiserror::Error;

/// Dependency resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    // ============ Scheduling Errors ============
    #[error("Worker pool unavailable: {message}")]
    WorkerPool { message: String },

    // ============ Per-Dependency Errors ============
    #[error("Failed to fetch dependency '{name}' from {repository}: {source}")]
    Fetch {
        name: String,
        repository: String,
        #[source]
        source: Box<ResolveError>,
    },

    #[error("Failed to load dependency '{name}': {source}")]
    Load {
        name: String,
        #[source]
        source: Box<CoreError>,
    },

    // ============ Aggregated Errors ============
    #[error("Failed to resolve dependency subtree:\n{}", render_failures(.failures))]
    Subtree { failures: Vec<ResolveError> },

    // ============ Collaborator Errors ============
    #[error("Repository client error: {message}")]
    Client { message: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ResolveError {
    /// Flattened view of every per-dependency failure in this error
    pub fn failures(&self) -> Vec<&ResolveError> {
        match self {
            ResolveError::Subtree { failures } => {
                failures.iter().flat_map(|f| f.failures()).collect()
            }
            other => vec![other],
        }
    }
}

fn render_failures(failures: &[ResolveError]) -> String {
    failures
        .iter()
        .map(|f| format!("  - {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type for resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;
