//! Charthaul Core - Chart model, artifact cache, and secure extraction
//!
//! This crate provides the foundational types used throughout charthaul:
//! - `Chart`: The loaded chart object with its attached dependency tree
//! - `CacheKey`: Reversible, filesystem-safe artifact addressing
//! - `ArtifactCache`: Stateless on-disk cache shared across invocations
//! - `extract_archive`: Hardened `.tar.gz` extraction (zip-slip safe)

pub mod cache;
pub mod chart;
pub mod error;
pub mod extract;
pub mod key;

pub use cache::ArtifactCache;
pub use chart::{Chart, ChartMetadata, DependencyRef};
pub use error::{CoreError, Result};
pub use extract::{extract_archive, ExtractOptions, ExtractedDir, DEFAULT_MAX_BYTES};
pub use key::CacheKey;
