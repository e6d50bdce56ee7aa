//! `wick clean` command.

use std::collections::HashSet;
use std::path::Path;
use wick_core::config::{resolve_settings, SettingsOverrides};
use wick_core::pkg::{lockfile, Lockfile, PkgError, Store};

pub fn run(project_dir: &Path, dry_run: bool) -> Result<(), PkgError> {
    let settings = resolve_settings(project_dir, &SettingsOverrides::default())?;
    let store = Store::new(settings.store_dir.clone());

    let lf = Lockfile::read_from(&lockfile::lockfile_path(project_dir))?;
    let referenced: HashSet<(String, String)> = lf
        .packages
        .values()
        .map(|pkg| (pkg.name.clone(), pkg.version.clone()))
        .collect();

    let removed = store.clean(&referenced, dry_run)?;
    for (name, version) in &removed {
        if dry_run {
            println!("Would remove {name}@{version}");
        } else {
            println!("Removed {name}@{version}");
        }
    }

    if dry_run {
        println!("Clean dry-run complete ({} entr{}).", removed.len(),
            if removed.len() == 1 { "y" } else { "ies" });
    } else {
        println!("Clean complete ({} entr{}).", removed.len(),
            if removed.len() == 1 { "y" } else { "ies" });
    }
    Ok(())
}
