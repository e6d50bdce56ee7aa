//! `wick validate` command.

use std::path::Path;
use wick_core::config::{resolve_settings, SettingsOverrides};
use wick_core::pkg::{lockfile, store, Lockfile, PkgError, Store};

pub fn run(project_dir: &Path) -> Result<(), PkgError> {
    let settings = resolve_settings(project_dir, &SettingsOverrides::default())?;
    let store = Store::new(settings.store_dir.clone());

    // read_from validates self-containment of the dependency edges.
    let lf = Lockfile::read_from(&lockfile::lockfile_path(project_dir))?;

    // Every lockfile entry must have its store directory.
    for pkg in lf.packages.values() {
        if !store.has(&pkg.name, &pkg.version) {
            return Err(PkgError::lockfile(format!(
                "Missing store entry: {}@{}",
                pkg.name, pkg.version
            )));
        }
    }

    // Every root must be linked in the project and resolve into the store.
    for root in &lf.roots {
        let name = root.rsplit_once('@').map_or(root.as_str(), |(n, _)| n);
        if !store::root_link_valid(project_dir, &store, name) {
            return Err(PkgError::lockfile(format!(
                "Root link {name} is missing or does not resolve into the store"
            )));
        }
    }

    println!("Valid.");
    Ok(())
}
