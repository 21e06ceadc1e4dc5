//! Charthaul dependency resolution
//!
//! This crate turns a fetched chart artifact into a fully populated
//! dependency tree:
//!
//! - **Cache-aware fetching**: every `(chart, project, url, version)` tuple
//!   is checked against the on-disk [`charthaul_core::ArtifactCache`] before
//!   the repository client is asked to pull it
//! - **Bounded concurrency**: one global worker bound caps concurrent
//!   fetch/extract/load work across the entire recursive tree
//! - **No partial trees**: a level's children are attached to their parent
//!   only once every sibling subtree has resolved; any failure discards the
//!   level and surfaces an aggregated error naming each broken dependency
//! - **Cancellation**: a [`CancelHandle`] aborts resolution at the next
//!   bound acquisition, distinct from dependency failures
//!
//! Registry transport and chart content parsing live behind the
//! [`RepoClient`] and [`ChartLoader`] seams; this crate orchestrates where
//! bytes land on disk and how the tree is assembled, nothing more.

pub mod client;
pub mod error;
pub mod handle;
pub mod resolver;

// Re-exports for convenience
pub use client::{ChartLoader, RepoClient};
pub use error::{ResolveError, Result};
pub use handle::{ArtifactHandle, ArtifactKind};
pub use resolver::{CancelHandle, Resolver, ResolverOptions};
