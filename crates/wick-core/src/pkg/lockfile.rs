//! Lockfile persistence and lockfile-driven operations.
//!
//! `wick.lock` records the ordered root keys plus every node of the
//! resolved graph:
//!
//! ```json
//! {
//!   "roots": ["a@1.0.0"],
//!   "packages": {
//!     "a@1.0.0": { "name": "a", "version": "1.0.0", "dependencies": { "b": "1.2.0" } },
//!     "b@1.2.0": { "name": "b", "version": "1.2.0" }
//!   }
//! }
//! ```
//!
//! The file is self-contained: every version referenced by any entry's
//! `dependencies` is itself a top-level key. `BTreeMap` keeps the JSON
//! deterministically ordered.

use super::error::PkgError;
use super::graph::{self, node_key, Node};
use super::registry::RegistryClient;
use super::spec::PackageSpec;
use super::version::resolve_version;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lockfile filename.
pub const LOCKFILE_NAME: &str = "wick.lock";

/// One locked package entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPackage {
    pub name: String,
    pub version: String,
    /// Dependency name -> resolved version.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
}

/// The complete lockfile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    /// Root keys (`name@version`), in install order.
    pub roots: Vec<String>,
    /// Every node of the graph, keyed by `name@version`.
    pub packages: BTreeMap<String, LockPackage>,
}

/// Path of the lockfile inside a project.
#[must_use]
pub fn lockfile_path(project_dir: &Path) -> PathBuf {
    project_dir.join(LOCKFILE_NAME)
}

impl Lockfile {
    /// Build a lockfile from a resolved graph.
    #[must_use]
    pub fn from_graph(roots: &[String], nodes: &BTreeMap<String, Node>) -> Self {
        let packages = nodes
            .iter()
            .map(|(key, node)| {
                (
                    key.clone(),
                    LockPackage {
                        name: node.name.clone(),
                        version: node.version.clone(),
                        dependencies: node.deps.clone(),
                    },
                )
            })
            .collect();
        Self {
            roots: roots.to_vec(),
            packages,
        }
    }

    /// Read and validate a lockfile.
    pub fn read_from(path: &Path) -> Result<Self, PkgError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PkgError::lockfile(format!("Cannot read {}: {e}", path.display()))
        })?;
        let lockfile: Self = serde_json::from_str(&content)
            .map_err(|e| PkgError::lockfile(format!("Invalid lockfile JSON: {e}")))?;
        lockfile.validate()?;
        Ok(lockfile)
    }

    /// Write the lockfile atomically, pretty-printed with 2-space indent.
    pub fn write_to(&self, path: &Path) -> Result<(), PkgError> {
        let mut content = serde_json::to_string_pretty(self)
            .map_err(|e| PkgError::lockfile(format!("Failed to serialize lockfile: {e}")))?;
        content.push('\n');
        wick_util::fs::atomic_write(path, content.as_bytes())
            .map_err(|e| PkgError::lockfile(format!("Failed to write lockfile: {e}")))
    }

    /// Check self-containment: every root and every dependency value must
    /// appear as a top-level package key.
    pub fn validate(&self) -> Result<(), PkgError> {
        for root in &self.roots {
            if !self.packages.contains_key(root) {
                return Err(PkgError::lockfile(format!(
                    "Root {root} missing from packages"
                )));
            }
        }
        for (key, pkg) in &self.packages {
            for (dep_name, dep_version) in &pkg.dependencies {
                let dep_key = node_key(dep_name, dep_version);
                if !self.packages.contains_key(&dep_key) {
                    return Err(PkgError::lockfile(format!(
                        "{key} depends on {dep_key}, which is not in the lockfile"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Keys reachable from the current roots via the dependency edges.
    #[must_use]
    pub fn reachable(&self) -> HashSet<String> {
        let mut reachable: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = self.roots.iter().cloned().collect();
        while let Some(key) = queue.pop_front() {
            if !reachable.insert(key.clone()) {
                continue;
            }
            if let Some(pkg) = self.packages.get(&key) {
                for (dep_name, dep_version) in &pkg.dependencies {
                    queue.push_back(node_key(dep_name, dep_version));
                }
            }
        }
        reachable
    }

    /// Drop the named roots and prune every package no longer reachable.
    pub fn remove_roots(&mut self, names: &[String]) {
        self.roots.retain(|root| {
            let root_name = root.rsplit_once('@').map_or(root.as_str(), |(n, _)| n);
            !names.iter().any(|n| n == root_name)
        });
        let reachable = self.reachable();
        self.packages.retain(|key, _| reachable.contains(key));
    }

    /// Deterministic digest of the lockfile contents.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let json = serde_json::to_string(self).expect("Lockfile serialization should not fail");
        wick_util::hash::blake3_bytes(json.as_bytes())
    }
}

/// Load the lockfile and re-resolve each entry's metadata through the
/// registry's exact-version rule.
///
/// A pinned version missing from the current registry document is an
/// error: the frozen contract.
pub async fn load(
    project_dir: &Path,
    registry: &RegistryClient,
) -> Result<(BTreeMap<String, Node>, Vec<String>), PkgError> {
    let lockfile = Lockfile::read_from(&lockfile_path(project_dir))?;
    nodes_from_lockfile(&lockfile, registry).await
}

/// Materialize graph nodes for every lockfile entry.
pub async fn nodes_from_lockfile(
    lockfile: &Lockfile,
    registry: &RegistryClient,
) -> Result<(BTreeMap<String, Node>, Vec<String>), PkgError> {
    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();

    for (key, pkg) in &lockfile.packages {
        let doc = registry.get_root_doc(&pkg.name).await?;
        let meta = doc.versions.get(&pkg.version).cloned().ok_or_else(|| {
            PkgError::lockfile(format!(
                "Lockfile pins {key} but the registry has no version {}",
                pkg.version
            ))
        })?;

        nodes.insert(
            key.clone(),
            Node {
                name: pkg.name.clone(),
                version: pkg.version.clone(),
                meta,
                deps: pkg.dependencies.clone(),
            },
        );
    }

    debug!(packages = nodes.len(), "Loaded lockfile");
    Ok((nodes, lockfile.roots.clone()))
}

/// Write the resolved graph as the project lockfile.
pub fn save(
    project_dir: &Path,
    roots: &[String],
    nodes: &BTreeMap<String, Node>,
) -> Result<(), PkgError> {
    Lockfile::from_graph(roots, nodes).write_to(&lockfile_path(project_dir))
}

/// Drop roots from the lockfile and prune unreachable packages.
pub fn remove(project_dir: &Path, names: &[String]) -> Result<Lockfile, PkgError> {
    let path = lockfile_path(project_dir);
    let mut lockfile = Lockfile::read_from(&path)?;
    lockfile.remove_roots(names);
    lockfile.write_to(&path)?;
    Ok(lockfile)
}

/// Semver policy applied when updating a root without an explicit spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Follow `dist-tags.latest`.
    #[default]
    Latest,
    /// Highest version sharing the current major.
    Minor,
    /// Highest version sharing the current major and minor.
    Patch,
}

impl UpdatePolicy {
    pub fn parse(s: &str) -> Result<Self, PkgError> {
        match s {
            "latest" => Ok(Self::Latest),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            other => Err(PkgError::resolution(format!(
                "Invalid update policy '{other}' (expected latest|minor|patch)"
            ))),
        }
    }
}

/// Re-resolve selected roots under a policy, rebuild the full graph, and
/// rewrite the lockfile.
///
/// `names` empty means every root. An explicit `name@spec` always
/// overrides the policy for that name. Returns the new graph so the
/// caller can install from it.
pub async fn update(
    project_dir: &Path,
    registry: &RegistryClient,
    names: &[String],
    policy: UpdatePolicy,
    explicit_specs: &HashMap<String, String>,
) -> Result<(BTreeMap<String, Node>, Vec<String>), PkgError> {
    let lockfile = Lockfile::read_from(&lockfile_path(project_dir))?;

    let mut requirements: Vec<PackageSpec> = Vec::new();
    for root in &lockfile.roots {
        let (name, current) = root
            .rsplit_once('@')
            .ok_or_else(|| PkgError::lockfile(format!("Malformed root key: {root}")))?;

        let selected = names.is_empty() || names.iter().any(|n| n == name);
        let range = if !selected {
            // Unselected roots stay pinned.
            Some(current.to_string())
        } else if let Some(spec) = explicit_specs.get(name) {
            Some(spec.clone())
        } else {
            let doc = registry.get_root_doc(name).await?;
            Some(policy_target(name, &doc, current, policy)?)
        };

        requirements.push(PackageSpec {
            name: name.to_string(),
            range,
        });
    }

    let (nodes, roots) = graph::build_graphs(registry, &requirements).await?;
    save(project_dir, &roots, &nodes)?;
    Ok((nodes, roots))
}

/// Pick the target version for one root under a policy.
fn policy_target(
    name: &str,
    doc: &super::registry::RootDoc,
    current: &str,
    policy: UpdatePolicy,
) -> Result<String, PkgError> {
    if policy == UpdatePolicy::Latest {
        return resolve_version(name, doc, "latest");
    }

    let current_version = Version::parse(current)
        .map_err(|e| PkgError::lockfile(format!("Unparseable pinned version {name}@{current}: {e}")))?;

    let best = doc
        .versions
        .keys()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| v.pre.is_empty())
        .filter(|v| match policy {
            UpdatePolicy::Minor => v.major == current_version.major,
            UpdatePolicy::Patch => {
                v.major == current_version.major && v.minor == current_version.minor
            }
            UpdatePolicy::Latest => unreachable!(),
        })
        .max();

    // Keep the pin when nothing strictly newer qualifies.
    match best {
        Some(v) if v > current_version => Ok(v.to_string()),
        _ => Ok(current.to_string()),
    }
}
