//! `wick update` command.

use std::collections::HashMap;
use std::path::Path;
use wick_core::config::{resolve_settings, SettingsOverrides};
use wick_core::pkg::{
    install, lockfile, InstallOptions, PackageSpec, PkgError, RegistryClient, Store, UpdatePolicy,
};

pub async fn run(project_dir: &Path, specs: &[String], policy: &str) -> Result<(), PkgError> {
    let settings = resolve_settings(project_dir, &SettingsOverrides::default())?;
    let registry = RegistryClient::from_settings(&settings)?;
    let store = Store::new(settings.store_dir.clone());

    let policy = UpdatePolicy::parse(policy)?;

    // Split "name@spec" arguments into the selected names and explicit pins.
    let mut names = Vec::new();
    let mut explicit: HashMap<String, String> = HashMap::new();
    for raw in specs {
        let spec = PackageSpec::parse(raw)?;
        if let Some(range) = &spec.range {
            explicit.insert(spec.name.clone(), range.clone());
        }
        names.push(spec.name);
    }

    let (nodes, roots) =
        lockfile::update(project_dir, &registry, &names, policy, &explicit).await?;

    let opts = InstallOptions {
        concurrency: settings.concurrency,
        ..Default::default()
    };
    install::install_resolved(project_dir, &store, &registry, &nodes, &roots, &opts).await?;

    println!("Updated and installed.");
    Ok(())
}
