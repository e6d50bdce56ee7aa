//! Install orchestration.
//!
//! Resolves the node set (from requirements or the lockfile), fans
//! fetch+verify+extract out over a worker pool, then links: store-side
//! dependency links after the pool drains, project root links and bins
//! serially, and finally the lockfile write. The first worker error wins
//! and cancels the remaining work; no lockfile is written on failure.

use super::error::PkgError;
use super::graph::{self, Node};
use super::integrity;
use super::lockfile::{self, Lockfile};
use super::registry::RegistryClient;
use super::spec::PackageSpec;
use super::store::{self, Store};
use super::tarball::{self, MAX_TARBALL_SIZE};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the up-to-date sentinel inside `node_modules`.
const STATE_FILE: &str = ".wick-state";

/// Default wall-clock budget for one install.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Knobs for one install run.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Install strictly from the lockfile; requirements only cross-check.
    pub frozen: bool,
    /// Worker count for the fetch pool.
    pub concurrency: usize,
    /// Wall-clock budget for the whole run.
    pub timeout: Duration,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            frozen: false,
            concurrency: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Outcome summary of an install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Root keys that were linked into the project.
    pub roots: Vec<String>,
    /// Total distinct packages in the graph.
    pub total: usize,
    /// Packages fetched from the network this run.
    pub downloaded: usize,
    /// Packages already present in the store.
    pub reused: usize,
    /// Whether the fast path skipped the work entirely.
    pub up_to_date: bool,
}

/// Run an install.
///
/// With requirements, the graph is resolved fresh; without requirements
/// (or with `frozen`) the lockfile drives everything.
pub async fn install(
    project_dir: &Path,
    store: &Store,
    registry: &RegistryClient,
    requirements: &[PackageSpec],
    opts: &InstallOptions,
) -> Result<InstallReport, PkgError> {
    tokio::time::timeout(opts.timeout, install_inner(project_dir, store, registry, requirements, opts))
        .await
        .map_err(|_| {
            PkgError::cancelled(format!(
                "Install timed out after {}s",
                opts.timeout.as_secs()
            ))
        })?
}

async fn install_inner(
    project_dir: &Path,
    store: &Store,
    registry: &RegistryClient,
    requirements: &[PackageSpec],
    opts: &InstallOptions,
) -> Result<InstallReport, PkgError> {
    let (nodes, roots) = if requirements.is_empty() || opts.frozen {
        let (nodes, roots) = lockfile::load(project_dir, registry).await?;

        if opts.frozen && !requirements.is_empty() {
            let root_names: HashSet<&str> = roots
                .iter()
                .map(|r| r.rsplit_once('@').map_or(r.as_str(), |(n, _)| n))
                .collect();
            for req in requirements {
                if !root_names.contains(req.name.as_str()) {
                    return Err(PkgError::lockfile(format!(
                        "'{}' is not a root of the lockfile (--frozen-lockfile)",
                        req.name
                    )));
                }
            }
        }

        (nodes, roots)
    } else {
        graph::build_graphs(registry, requirements).await?
    };

    install_resolved(project_dir, store, registry, &nodes, &roots, opts).await
}

/// Install an already-resolved graph: fetch everything, link everything,
/// write the lockfile.
pub async fn install_resolved(
    project_dir: &Path,
    store: &Store,
    registry: &RegistryClient,
    nodes: &BTreeMap<String, Node>,
    roots: &[String],
    opts: &InstallOptions,
) -> Result<InstallReport, PkgError> {
    let lockfile = Lockfile::from_graph(roots, nodes);
    let content_hash = lockfile.content_hash();
    let state_file = project_dir.join("node_modules").join(STATE_FILE);

    // The fast path may only fire while every invariant still holds on
    // disk: store entries present AND every root link resolving into the
    // store.
    if let Ok(prev) = fs::read_to_string(&state_file) {
        if prev.trim() == content_hash
            && nodes.values().all(|n| store.has(&n.name, &n.version))
            && roots.iter().all(|r| {
                nodes
                    .get(r)
                    .map_or(false, |n| store::root_link_valid(project_dir, store, &n.name))
            })
        {
            debug!("node_modules is up-to-date, skipping install");
            return Ok(InstallReport {
                roots: roots.to_vec(),
                total: nodes.len(),
                downloaded: 0,
                reused: nodes.len(),
                up_to_date: true,
            });
        }
    }

    // Phase 1: fetch + verify + extract, one task per distinct node. The
    // first failure aborts; dropping the stream cancels in-flight work.
    let mut downloaded = 0usize;
    let mut reused = 0usize;
    {
        let mut tasks = stream::iter(nodes.values().cloned().map(|node| {
            let store = store.clone();
            let registry = registry.clone();
            async move { fetch_node(&store, &registry, &node).await }
        }))
        .buffer_unordered(opts.concurrency.max(1));

        while let Some(result) = tasks.next().await {
            if result? {
                downloaded += 1;
            } else {
                reused += 1;
            }
        }
    }

    // Phase 2: store-side dependency links. Every fetch has completed, so
    // every link target exists.
    {
        let link_nodes: Vec<Node> = nodes.values().cloned().collect();
        let link_store = store.clone();
        tokio::task::spawn_blocking(move || {
            use rayon::prelude::*;
            link_nodes
                .par_iter()
                .try_for_each(|node| link_store.link_node_deps(node))
        })
        .await
        .map_err(|e| PkgError::filesystem(format!("Dependency linking task failed: {e}")))??;
    }

    // Phase 3: project wiring, orchestrator thread only.
    for root in roots {
        let node = nodes
            .get(root)
            .ok_or_else(|| PkgError::lockfile(format!("Root {root} missing from graph")))?;
        store::link_root(project_dir, store, node)?;
        if let Err(e) = store::link_bins(project_dir, store, node) {
            warn!(root = %root, error = %e, "Failed to link binaries");
        }
    }

    lockfile.write_to(&lockfile::lockfile_path(project_dir))?;

    let node_modules = project_dir.join("node_modules");
    if let Err(e) =
        fs::create_dir_all(&node_modules).and_then(|()| fs::write(&state_file, &content_hash))
    {
        warn!(error = %e, "Failed to write install state");
    }

    debug!(
        total = nodes.len(),
        downloaded,
        reused,
        roots = roots.len(),
        "Install completed"
    );

    Ok(InstallReport {
        roots: roots.to_vec(),
        total: nodes.len(),
        downloaded,
        reused,
        up_to_date: false,
    })
}

/// Fetch one node into the store. Returns `true` if the tarball was
/// downloaded, `false` if the store already had the entry.
async fn fetch_node(
    store: &Store,
    registry: &RegistryClient,
    node: &Node,
) -> Result<bool, PkgError> {
    if store.has(&node.name, &node.version) {
        return Ok(false);
    }

    let key = node.key();
    let url = node.meta.dist.tarball.clone();
    if url.is_empty() {
        return Err(PkgError::protocol(format!("No tarball URL for {key}")));
    }

    debug!(key = %key, url = %url, "Downloading tarball");
    let bytes = tarball::download_tarball(registry, &url, MAX_TARBALL_SIZE).await?;

    let dest = store.path(&node.name, &node.version);
    let integrity = node.meta.dist.integrity.clone();
    let shasum = node.meta.dist.shasum.clone();

    // Hashing and decompression are CPU-bound.
    tokio::task::spawn_blocking(move || {
        verify_and_extract(
            &key,
            &bytes,
            integrity.as_deref(),
            shasum.as_deref(),
            &dest,
        )
    })
    .await
    .map_err(|e| PkgError::archive(format!("Extraction task failed: {e}")))??;

    Ok(true)
}

/// Verify archive bytes, then extract. A failed verification never
/// produces a store entry.
fn verify_and_extract(
    key: &str,
    bytes: &[u8],
    integrity: Option<&str>,
    shasum: Option<&str>,
    dest: &Path,
) -> Result<(), PkgError> {
    integrity::verify(key, bytes, integrity, shasum)?;
    tarball::extract_tgz_atomic(bytes, dest)
}
