//! Recursive bounded-concurrency dependency resolution
//!
//! Resolution walks the declared dependency graph one level at a time.
//! Each level fans its dependencies out as tasks, every task routing its
//! fetch/extract/load work through one global semaphore shared by the
//! whole tree, and the level joins on all of them before deciding its own
//! fate. Siblings always run to completion; a level attaches its children
//! only when every subtree succeeded, otherwise the successes are discarded
//! and the failures surface as one aggregated error.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use charthaul_core::extract::{ExtractOptions, DEFAULT_MAX_BYTES};
use charthaul_core::{ArtifactCache, CacheKey, Chart, chart::DependencyRef};

use crate::client::{ChartLoader, RepoClient};
use crate::error::{ResolveError, Result};
use crate::handle::ArtifactHandle;

/// Resolution options
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Maximum concurrent fetch/load tasks across the whole tree
    pub workers: usize,

    /// Decompressed size cap per archive, 0 disables the bound
    pub max_bytes: u64,

    /// Honor archive file modes instead of forcing `0644`
    pub preserve_mode: bool,

    /// Drop embedded values schemas after loading, skipping expensive
    /// remote-schema validation in the loader
    pub skip_schema_validation: bool,

    /// Project the resolution runs for, part of every cache key
    pub project: String,

    /// Parent directory for extraction scratch space
    pub work_dir: Option<PathBuf>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4),
            max_bytes: DEFAULT_MAX_BYTES,
            preserve_mode: false,
            skip_schema_validation: false,
            project: String::new(),
            work_dir: None,
        }
    }
}

/// Cancels an in-flight resolution
///
/// Cancellation is observed at every worker-bound acquisition point:
/// pending acquisitions fail immediately with a worker-pool error and the
/// affected levels abort without waiting for in-flight siblings.
#[derive(Clone)]
pub struct CancelHandle {
    workers: Arc<Semaphore>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.workers.close();
    }
}

/// Concurrent dependency-tree resolver
pub struct Resolver<C, L> {
    inner: Arc<Inner<C, L>>,
}

struct Inner<C, L> {
    client: C,
    loader: L,
    cache: Arc<ArtifactCache>,
    opts: ResolverOptions,
    workers: Arc<Semaphore>,
}

impl<C, L> Inner<C, L> {
    fn extract_opts(&self) -> ExtractOptions {
        ExtractOptions {
            max_bytes: self.opts.max_bytes,
            preserve_mode: self.opts.preserve_mode,
            work_dir: self.opts.work_dir.clone(),
        }
    }
}

impl<C, L> Resolver<C, L>
where
    C: RepoClient + 'static,
    L: ChartLoader + 'static,
{
    pub fn new(client: C, loader: L, cache: Arc<ArtifactCache>, opts: ResolverOptions) -> Self {
        let workers = Arc::new(Semaphore::new(opts.workers.max(1)));
        Self {
            inner: Arc::new(Inner {
                client,
                loader,
                cache,
                opts,
                workers,
            }),
        }
    }

    /// The repository client this resolver fetches through
    pub fn client(&self) -> &C {
        &self.inner.client
    }

    /// The chart loader this resolver parses with
    pub fn loader(&self) -> &L {
        &self.inner.loader
    }

    /// Handle for cancelling this resolver's in-flight work
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            workers: self.inner.workers.clone(),
        }
    }

    /// Load a fetched artifact and resolve its full dependency tree
    ///
    /// Extracts the artifact if it is packed, parses it through the loader
    /// collaborator, then recursively attaches every transitive dependency.
    /// Extraction scratch space is reclaimed before returning.
    pub async fn load(&self, handle: &ArtifactHandle) -> Result<Chart> {
        let extracted = handle.extract(&self.inner.extract_opts())?;

        let loaded = self
            .inner
            .loader
            .load(extracted.path())
            .map_err(|e| ResolveError::Load {
                name: handle.name.clone(),
                source: Box::new(e),
            });

        let result = match loaded {
            Ok(mut chart) => {
                if self.inner.opts.skip_schema_validation {
                    chart.strip_schema();
                }
                resolve_node(self.inner.clone(), chart).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = extracted.release() {
            tracing::warn!("Failed to reclaim extraction directory: {}", e);
        }
        result
    }

    /// Resolve the dependency tree of an already-loaded chart
    pub async fn resolve(&self, chart: Chart) -> Result<Chart> {
        resolve_node(self.inner.clone(), chart).await
    }
}

/// Resolve one node: fan out its declared dependencies, join, aggregate
fn resolve_node<C, L>(inner: Arc<Inner<C, L>>, mut chart: Chart) -> BoxFuture<'static, Result<Chart>>
where
    C: RepoClient + 'static,
    L: ChartLoader + 'static,
{
    async move {
        let declared = chart.metadata.dependencies.clone();
        if declared.is_empty() {
            return Ok(chart);
        }

        // Charts can ship dependencies vendored alongside them; the loader
        // attaches those up front and they are reused, never re-fetched.
        let mut embedded = chart.take_dependencies();
        let mut resolved = Vec::with_capacity(declared.len());
        let mut tasks: JoinSet<Result<Chart>> = JoinSet::new();

        for dep in declared {
            if let Some(pos) = embedded.iter().position(|c| c.name() == dep.name) {
                tracing::debug!("Reusing embedded dependency {}", dep.name);
                resolved.push(embedded.swap_remove(pos));
                continue;
            }
            let inner = inner.clone();
            tasks.spawn(async move { resolve_dependency(inner, dep).await });
        }

        // Join barrier: every launched sibling posts a result before this
        // level decides anything.
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(child)) => resolved.push(child),
                Ok(Err(e @ ResolveError::WorkerPool { .. })) => {
                    // Cancellation short-circuits the level instead of
                    // waiting for in-flight siblings.
                    tasks.abort_all();
                    return Err(e);
                }
                Ok(Err(e)) => failures.push(e),
                Err(join_err) => {
                    tasks.abort_all();
                    return Err(ResolveError::WorkerPool {
                        message: join_err.to_string(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            // All-or-nothing per level: the successes are discarded so a
            // partially resolved subtree is never attached to a parent.
            return Err(ResolveError::Subtree { failures });
        }

        chart.set_dependencies(resolved);
        Ok(chart)
    }
    .boxed()
}

/// Fetch, extract, load, and recursively resolve one dependency
async fn resolve_dependency<C, L>(inner: Arc<Inner<C, L>>, dep: DependencyRef) -> Result<Chart>
where
    C: RepoClient + 'static,
    L: ChartLoader + 'static,
{
    // One unit of the global bound covers this dependency's fetch, extract,
    // and load. Acquisition fails only when resolution has been cancelled.
    let permit = inner
        .workers
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ResolveError::WorkerPool {
            message: "resolution cancelled".to_string(),
        })?;

    let key = CacheKey::new(
        &dep.name,
        &inner.opts.project,
        &dep.repository,
        &dep.version,
    );

    let handle = match inner.cache.path_if_exists(&key) {
        Some(path) => {
            tracing::debug!("Cache hit for {}", key);
            ArtifactHandle::from_cached_path(&dep.name, &dep.repository, path)
        }
        None => inner
            .client
            .pull(&dep.name, &dep.repository, &dep.version)
            .await
            .map_err(|e| ResolveError::Fetch {
                name: dep.name.clone(),
                repository: dep.repository.clone(),
                source: Box::new(e),
            })?,
    };

    let extracted = handle
        .extract(&inner.extract_opts())
        .map_err(|e| ResolveError::Load {
            name: dep.name.clone(),
            source: Box::new(e),
        })?;

    let loaded = inner
        .loader
        .load(extracted.path())
        .map_err(|e| ResolveError::Load {
            name: dep.name.clone(),
            source: Box::new(e),
        });

    if let Err(e) = extracted.release() {
        tracing::warn!("Failed to reclaim extraction directory: {}", e);
    }
    let mut child = loaded?;

    if inner.opts.skip_schema_validation {
        child.strip_schema();
    }

    // Release the permit before descending: the bound caps concurrent
    // fetch/load work, and holding it across the whole subtree would
    // starve trees deeper than the worker count.
    drop(permit);

    resolve_node(inner, child).await
}
