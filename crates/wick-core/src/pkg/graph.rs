//! Transitive dependency graph construction.
//!
//! Expands a set of top-level requirements into the full deduplicated set
//! of `(name, version)` nodes by breadth-first traversal over registry
//! metadata. Cycles are tolerated: the `name@version` key set is the sole
//! dedup and termination mechanism.

use super::error::PkgError;
use super::registry::{RegistryClient, VersionMeta};
use super::spec::PackageSpec;
use super::version::resolve_version;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::debug;

/// One resolved package in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub version: String,
    /// Registry metadata for this exact version.
    pub meta: VersionMeta,
    /// Outgoing edges: dependency name -> resolved version.
    pub deps: BTreeMap<String, String>,
}

impl Node {
    /// Canonical `name@version` key.
    #[must_use]
    pub fn key(&self) -> String {
        node_key(&self.name, &self.version)
    }
}

/// Canonical graph/lockfile key for a package version.
#[must_use]
pub fn node_key(name: &str, version: &str) -> String {
    format!("{name}@{version}")
}

/// Resolve `(name, spec)` to a concrete version plus its metadata.
pub async fn resolve(
    registry: &RegistryClient,
    name: &str,
    spec: &str,
) -> Result<(String, VersionMeta), PkgError> {
    let doc = registry.get_root_doc(name).await?;
    let version = resolve_version(name, &doc, spec)?;
    let meta = doc
        .versions
        .get(&version)
        .cloned()
        .ok_or_else(|| PkgError::protocol(format!("No metadata for {name}@{version}")))?;
    Ok((version, meta))
}

/// Expand a single requirement into its full graph.
///
/// Returns the deduplicated node set and the root's key.
pub async fn build_graph(
    registry: &RegistryClient,
    name: &str,
    spec: &str,
) -> Result<(BTreeMap<String, Node>, String), PkgError> {
    let requirement = PackageSpec {
        name: name.to_string(),
        range: if spec.is_empty() {
            None
        } else {
            Some(spec.to_string())
        },
    };
    let (nodes, roots) = build_graphs(registry, std::slice::from_ref(&requirement)).await?;
    let root = roots.into_iter().next().expect("one root per requirement");
    Ok((nodes, root))
}

/// Expand a set of requirements into one merged graph.
///
/// Node sets are merged by key; resolution is deterministic per
/// `(name, version)`, so coalescing identical keys is always safe.
pub async fn build_graphs(
    registry: &RegistryClient,
    requirements: &[PackageSpec],
) -> Result<(BTreeMap<String, Node>, Vec<String>), PkgError> {
    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, String, VersionMeta)> = VecDeque::new();
    let mut roots: Vec<String> = Vec::new();

    for req in requirements {
        let (version, meta) = resolve(registry, &req.name, req.range_or_latest()).await?;
        let key = node_key(&req.name, &version);
        if !roots.contains(&key) {
            roots.push(key.clone());
        }
        if seen.insert(key) {
            queue.push_back((req.name.clone(), version, meta));
        }
    }

    while let Some((name, version, meta)) = queue.pop_front() {
        let mut deps: BTreeMap<String, String> = BTreeMap::new();

        for (dep_name, dep_spec) in &meta.dependencies {
            let (dep_version, dep_meta) = resolve(registry, dep_name, dep_spec).await?;
            deps.insert(dep_name.clone(), dep_version.clone());

            let dep_key = node_key(dep_name, &dep_version);
            if seen.insert(dep_key) {
                queue.push_back((dep_name.clone(), dep_version, dep_meta));
            }
        }

        let node = Node {
            name: name.clone(),
            version: version.clone(),
            meta,
            deps,
        };
        nodes.insert(node.key(), node);
    }

    debug!(nodes = nodes.len(), roots = roots.len(), "Graph built");
    Ok((nodes, roots))
}
