//! Content-addressable store and symlink layout.
//!
//! Every extracted package lives at `<store>/<name>/<version>/`. Inside
//! each entry, `node_modules/` holds one symlink per declared dependency,
//! pointing back into the store — the isolated layout: a package sees only
//! its own deps. Project roots are symlinked from
//! `<project>/node_modules/<name>`, binaries from
//! `<project>/node_modules/.bin/<bin-name>`.

use super::error::PkgError;
use super::graph::Node;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Handle to the on-disk package store.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store directory for one package version. A scoped name contributes
    /// two path segments (`@scope/name` -> `@scope/name/version`).
    #[must_use]
    pub fn path(&self, name: &str, version: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in name.split('/') {
            path.push(segment);
        }
        path.push(version);
        path
    }

    /// Whether a store entry exists (and is therefore complete).
    #[must_use]
    pub fn has(&self, name: &str, version: &str) -> bool {
        self.path(name, version).is_dir()
    }

    /// Link every declared dependency of `node` into the entry's own
    /// `node_modules/`.
    pub fn link_node_deps(&self, node: &Node) -> Result<(), PkgError> {
        if node.deps.is_empty() {
            return Ok(());
        }

        let node_modules = self.path(&node.name, &node.version).join("node_modules");
        for (dep_name, dep_version) in &node.deps {
            let target = self.path(dep_name, dep_version);
            let link = package_link_path(&node_modules, dep_name)?;
            ensure_symlink(&target, &link)?;
        }
        Ok(())
    }

    /// List all `(name, version)` entries in the store.
    pub fn list_entries(&self) -> Result<Vec<(String, String)>, PkgError> {
        let mut result = Vec::new();
        if !self.root.exists() {
            return Ok(result);
        }
        scan_entries(&self.root, None, &mut result)?;
        result.sort();
        Ok(result)
    }

    /// Remove store entries not in `referenced`. With `dry_run`, only
    /// reports what would be removed.
    pub fn clean(
        &self,
        referenced: &HashSet<(String, String)>,
        dry_run: bool,
    ) -> Result<Vec<(String, String)>, PkgError> {
        let mut removed = Vec::new();
        for (name, version) in self.list_entries()? {
            if referenced.contains(&(name.clone(), version.clone())) {
                continue;
            }
            if !dry_run {
                fs::remove_dir_all(self.path(&name, &version))?;
            }
            removed.push((name, version));
        }
        Ok(removed)
    }
}

fn scan_entries(
    dir: &Path,
    scope: Option<&str>,
    result: &mut Vec<(String, String)>,
) -> Result<(), PkgError> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(());
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let file_name = entry.file_name();
        let name_str = file_name.to_string_lossy();
        if name_str.starts_with('.') {
            continue;
        }

        if scope.is_none() && name_str.starts_with('@') {
            scan_entries(&path, Some(&name_str), result)?;
            continue;
        }

        let pkg_name = match scope {
            Some(scope) => format!("{scope}/{name_str}"),
            None => name_str.to_string(),
        };

        if let Ok(version_entries) = fs::read_dir(&path) {
            for version_entry in version_entries.flatten() {
                if !version_entry.path().is_dir() {
                    continue;
                }
                let version = version_entry.file_name().to_string_lossy().to_string();
                if version.starts_with('.') {
                    continue;
                }
                result.push((pkg_name.clone(), version));
            }
        }
    }
    Ok(())
}

/// Create `link -> target`, replacing whatever currently occupies the link
/// path. The link's parent directories are created as needed.
pub fn ensure_symlink(target: &Path, link: &Path) -> Result<(), PkgError> {
    if link.exists() || link.symlink_metadata().is_ok() {
        remove_link_or_dir(link)?;
    }
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    create_dir_link(target, link)
}

/// Remove a symlink, file, or directory tree at `path`.
fn remove_link_or_dir(path: &Path) -> Result<(), PkgError> {
    if let Ok(metadata) = fs::symlink_metadata(path) {
        if metadata.file_type().is_symlink() {
            fs::remove_file(path).map_err(|e| {
                PkgError::filesystem(format!("Failed to remove existing symlink: {e}"))
            })?;
            return Ok(());
        }
    }

    if path.is_dir() {
        fs::remove_dir_all(path).map_err(|e| {
            PkgError::filesystem(format!("Failed to remove existing directory: {e}"))
        })?;
    } else if path.exists() {
        fs::remove_file(path)
            .map_err(|e| PkgError::filesystem(format!("Failed to remove existing file: {e}")))?;
    }
    Ok(())
}

fn create_dir_link(target: &Path, link: &Path) -> Result<(), PkgError> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).map_err(|e| {
            PkgError::filesystem(format!(
                "Failed to create symlink {} -> {}: {e}",
                link.display(),
                target.display()
            ))
        })
    }

    #[cfg(not(unix))]
    {
        // No symlink support: fall back to a recursive copy.
        copy_dir_all(target, link)
            .map_err(|e| PkgError::filesystem(format!("Failed to copy directory: {e}")))
    }
}

#[cfg(not(unix))]
fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        if ty.is_dir() {
            copy_dir_all(&entry.path(), &dst.join(entry.file_name()))?;
        } else {
            fs::copy(entry.path(), dst.join(entry.file_name()))?;
        }
    }
    Ok(())
}

/// Link path for a package under `parent`, handling scoped names
/// (`@scope/name` becomes `parent/@scope/name`).
fn package_link_path(parent: &Path, pkg_name: &str) -> Result<PathBuf, PkgError> {
    if pkg_name.starts_with('@') {
        let parts: Vec<&str> = pkg_name.splitn(2, '/').collect();
        if parts.len() != 2 {
            return Err(PkgError::filesystem(format!(
                "Invalid scoped package name: {pkg_name}"
            )));
        }
        Ok(parent.join(parts[0]).join(parts[1]))
    } else {
        Ok(parent.join(pkg_name))
    }
}

/// Symlink a root package into the project's `node_modules`.
pub fn link_root(project_dir: &Path, store: &Store, node: &Node) -> Result<PathBuf, PkgError> {
    let node_modules = project_dir.join("node_modules");
    let link = package_link_path(&node_modules, &node.name)?;
    let target = store.path(&node.name, &node.version);
    ensure_symlink(&target, &link)?;
    debug!(name = %node.name, link = %link.display(), "Linked root");
    Ok(link)
}

/// Link a root's binaries into `<project>/node_modules/.bin/`.
///
/// The `bin` field of the extracted `package.json` is either a string (the
/// binary takes the package's name) or an object of name -> relative path.
pub fn link_bins(project_dir: &Path, store: &Store, node: &Node) -> Result<Vec<PathBuf>, PkgError> {
    let pkg_dir = store.path(&node.name, &node.version);
    let package_json_path = pkg_dir.join("package.json");

    let content = match fs::read_to_string(&package_json_path) {
        Ok(c) => c,
        // No manifest, no binaries.
        Err(_) => return Ok(Vec::new()),
    };
    let manifest: Value = serde_json::from_str(&content).map_err(|e| {
        PkgError::filesystem(format!("Invalid package.json for {}: {e}", node.name))
    })?;

    let Some(bin_field) = manifest.get("bin") else {
        return Ok(Vec::new());
    };

    let bin_dir = project_dir.join("node_modules").join(".bin");
    let mut linked = Vec::new();

    match bin_field {
        Value::String(rel_path) => {
            let bin_name = node.name.split('/').next_back().unwrap_or(&node.name);
            linked.push(link_bin(&bin_dir, bin_name, &pkg_dir, rel_path)?);
        }
        Value::Object(bins) => {
            for (bin_name, rel_path) in bins {
                if let Value::String(rel_path) = rel_path {
                    linked.push(link_bin(&bin_dir, bin_name, &pkg_dir, rel_path)?);
                }
            }
        }
        _ => {}
    }

    Ok(linked)
}

fn link_bin(
    bin_dir: &Path,
    bin_name: &str,
    pkg_dir: &Path,
    rel_path: &str,
) -> Result<PathBuf, PkgError> {
    let rel = Path::new(rel_path);
    if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(PkgError::filesystem(format!(
            "Unsafe bin path '{rel_path}' for {bin_name}"
        )));
    }

    let target = pkg_dir.join(rel);
    let link = bin_dir.join(bin_name);
    ensure_symlink(&target, &link)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(&target) {
            let mut perms = metadata.permissions();
            perms.set_mode(perms.mode() | 0o111);
            let _ = fs::set_permissions(&target, perms);
        }
    }

    Ok(link)
}

/// Whether the project's root link for `name` exists and resolves (via
/// one or more symlink hops) into the store.
#[must_use]
pub fn root_link_valid(project_dir: &Path, store: &Store, name: &str) -> bool {
    let Ok(link) = package_link_path(&project_dir.join("node_modules"), name) else {
        return false;
    };
    if link.symlink_metadata().is_err() {
        return false;
    }
    let (Ok(resolved), Ok(store_root)) = (link.canonicalize(), store.root().canonicalize()) else {
        return false;
    };
    resolved.starts_with(store_root)
}

/// Remove root links and matching bin links from the project. Best-effort;
/// missing entries are not an error.
pub fn unlink_roots(project_dir: &Path, names: &[String]) {
    let node_modules = project_dir.join("node_modules");
    for name in names {
        if let Ok(link) = package_link_path(&node_modules, name) {
            let _ = remove_link_or_dir(&link);
        }
        let bin = node_modules.join(".bin").join(name);
        let _ = remove_link_or_dir(&bin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn make_node(name: &str, version: &str, deps: &[(&str, &str)]) -> Node {
        Node {
            name: name.to_string(),
            version: version.to_string(),
            meta: crate::pkg::registry::VersionMeta::default(),
            deps: deps
                .iter()
                .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn seed_entry(store: &Store, name: &str, version: &str, manifest: &str) {
        let dir = store.path(name, version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), manifest).unwrap();
    }

    #[test]
    fn test_store_path_unscoped() {
        let store = Store::new(PathBuf::from("/store"));
        assert_eq!(
            store.path("react", "18.2.0"),
            PathBuf::from("/store/react/18.2.0")
        );
    }

    #[test]
    fn test_store_path_scoped() {
        let store = Store::new(PathBuf::from("/store"));
        assert_eq!(
            store.path("@types/node", "20.0.0"),
            PathBuf::from("/store/@types/node/20.0.0")
        );
    }

    #[test]
    fn test_ensure_symlink_creates_and_replaces() {
        let dir = tempdir().unwrap();
        let target_a = dir.path().join("a");
        let target_b = dir.path().join("b");
        fs::create_dir_all(&target_a).unwrap();
        fs::create_dir_all(&target_b).unwrap();
        fs::write(target_a.join("marker"), "a").unwrap();
        fs::write(target_b.join("marker"), "b").unwrap();

        let link = dir.path().join("nested").join("link");
        ensure_symlink(&target_a, &link).unwrap();
        assert_eq!(fs::read_to_string(link.join("marker")).unwrap(), "a");

        // Repointing replaces the old link.
        ensure_symlink(&target_b, &link).unwrap();
        assert_eq!(fs::read_to_string(link.join("marker")).unwrap(), "b");
    }

    #[test]
    fn test_ensure_symlink_replaces_real_directory() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("new.txt"), "new").unwrap();

        let link = dir.path().join("link");
        fs::create_dir_all(&link).unwrap();
        fs::write(link.join("old.txt"), "old").unwrap();

        ensure_symlink(&target, &link).unwrap();
        assert!(link.join("new.txt").exists());
        assert!(!link.join("old.txt").exists());
    }

    #[test]
    fn test_link_node_deps_isolated_layout() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("store"));
        seed_entry(&store, "a", "1.0.0", r#"{"name":"a"}"#);
        seed_entry(&store, "b", "2.0.0", r#"{"name":"b"}"#);

        let node = make_node("a", "1.0.0", &[("b", "2.0.0")]);
        store.link_node_deps(&node).unwrap();

        let dep_link = store.path("a", "1.0.0").join("node_modules").join("b");
        assert!(dep_link.join("package.json").exists());
    }

    #[test]
    fn test_link_node_deps_scoped() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("store"));
        seed_entry(&store, "a", "1.0.0", r#"{"name":"a"}"#);
        seed_entry(&store, "@types/node", "20.0.0", r#"{"name":"@types/node"}"#);

        let node = make_node("a", "1.0.0", &[("@types/node", "20.0.0")]);
        store.link_node_deps(&node).unwrap();

        let dep_link = store
            .path("a", "1.0.0")
            .join("node_modules")
            .join("@types")
            .join("node");
        assert!(dep_link.join("package.json").exists());
    }

    #[test]
    fn test_link_root() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        let store = Store::new(dir.path().join("store"));
        seed_entry(&store, "a", "1.0.0", r#"{"name":"a"}"#);

        let node = make_node("a", "1.0.0", &[]);
        let link = link_root(&project, &store, &node).unwrap();

        assert_eq!(link, project.join("node_modules").join("a"));
        assert!(link.join("package.json").exists());
    }

    #[test]
    fn test_link_bins_string_form() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        let store = Store::new(dir.path().join("store"));
        seed_entry(
            &store,
            "prettier",
            "3.0.0",
            r#"{"name":"prettier","bin":"./bin/prettier.cjs"}"#,
        );
        let bin_src = store.path("prettier", "3.0.0").join("bin");
        fs::create_dir_all(&bin_src).unwrap();
        fs::write(bin_src.join("prettier.cjs"), "#!/usr/bin/env node\n").unwrap();

        let node = make_node("prettier", "3.0.0", &[]);
        let bins = link_bins(&project, &store, &node).unwrap();

        assert_eq!(bins.len(), 1);
        assert!(project.join("node_modules/.bin/prettier").exists());
    }

    #[test]
    fn test_link_bins_object_form() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        let store = Store::new(dir.path().join("store"));
        seed_entry(
            &store,
            "typescript",
            "5.0.0",
            r#"{"name":"typescript","bin":{"tsc":"./bin/tsc","tsserver":"./bin/tsserver"}}"#,
        );
        let bin_src = store.path("typescript", "5.0.0").join("bin");
        fs::create_dir_all(&bin_src).unwrap();
        fs::write(bin_src.join("tsc"), "x").unwrap();
        fs::write(bin_src.join("tsserver"), "x").unwrap();

        let node = make_node("typescript", "5.0.0", &[]);
        let bins = link_bins(&project, &store, &node).unwrap();

        assert_eq!(bins.len(), 2);
        assert!(project.join("node_modules/.bin/tsc").exists());
        assert!(project.join("node_modules/.bin/tsserver").exists());
    }

    #[test]
    fn test_link_bins_scoped_string_form_uses_last_segment() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        let store = Store::new(dir.path().join("store"));
        seed_entry(
            &store,
            "@scope/tool",
            "1.0.0",
            r#"{"name":"@scope/tool","bin":"cli.js"}"#,
        );
        fs::write(store.path("@scope/tool", "1.0.0").join("cli.js"), "x").unwrap();

        let node = make_node("@scope/tool", "1.0.0", &[]);
        link_bins(&project, &store, &node).unwrap();

        assert!(project.join("node_modules/.bin/tool").exists());
    }

    #[test]
    fn test_link_bins_rejects_escaping_path() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        let store = Store::new(dir.path().join("store"));
        seed_entry(
            &store,
            "evil",
            "1.0.0",
            r#"{"name":"evil","bin":{"evil":"../../outside"}}"#,
        );

        let node = make_node("evil", "1.0.0", &[]);
        assert!(link_bins(&project, &store, &node).is_err());
    }

    #[test]
    fn test_link_bins_no_bin_field() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        let store = Store::new(dir.path().join("store"));
        seed_entry(&store, "lodash", "4.0.0", r#"{"name":"lodash"}"#);

        let node = make_node("lodash", "4.0.0", &[]);
        assert!(link_bins(&project, &store, &node).unwrap().is_empty());
    }

    #[test]
    fn test_list_entries_and_clean() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("store"));
        seed_entry(&store, "a", "1.0.0", "{}");
        seed_entry(&store, "b", "2.0.0", "{}");
        seed_entry(&store, "@types/node", "20.0.0", "{}");

        let entries = store.list_entries().unwrap();
        assert_eq!(entries.len(), 3);

        let referenced: HashSet<(String, String)> =
            [("a".to_string(), "1.0.0".to_string())].into_iter().collect();

        // Dry run removes nothing.
        let would_remove = store.clean(&referenced, true).unwrap();
        assert_eq!(would_remove.len(), 2);
        assert!(store.has("b", "2.0.0"));

        let removed = store.clean(&referenced, false).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(store.has("a", "1.0.0"));
        assert!(!store.has("b", "2.0.0"));
        assert!(!store.has("@types/node", "20.0.0"));
    }

    #[test]
    fn test_root_link_valid() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        let store = Store::new(dir.path().join("store"));
        seed_entry(&store, "a", "1.0.0", r#"{"name":"a"}"#);

        // No link yet.
        assert!(!root_link_valid(&project, &store, "a"));

        let node = make_node("a", "1.0.0", &[]);
        link_root(&project, &store, &node).unwrap();
        assert!(root_link_valid(&project, &store, "a"));

        // A link pointing outside the store does not count.
        let elsewhere = dir.path().join("elsewhere");
        fs::create_dir_all(&elsewhere).unwrap();
        ensure_symlink(&elsewhere, &project.join("node_modules").join("a")).unwrap();
        assert!(!root_link_valid(&project, &store, "a"));

        // A dangling link does not count either.
        unlink_roots(&project, &["a".to_string()]);
        assert!(!root_link_valid(&project, &store, "a"));
    }

    #[test]
    fn test_unlink_roots() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        let store = Store::new(dir.path().join("store"));
        seed_entry(&store, "a", "1.0.0", r#"{"name":"a"}"#);

        let node = make_node("a", "1.0.0", &[]);
        link_root(&project, &store, &node).unwrap();
        assert!(project.join("node_modules/a").exists());

        unlink_roots(&project, &["a".to_string()]);
        assert!(!project.join("node_modules/a").exists());
    }
}
