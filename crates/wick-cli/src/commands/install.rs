//! `wick install` command.

use std::path::{Path, PathBuf};
use wick_core::config::{resolve_settings, SettingsOverrides};
use wick_core::pkg::{install, InstallOptions, PackageSpec, PkgError, RegistryClient, Store};

pub struct InstallArgs {
    pub specs: Vec<String>,
    pub frozen_lockfile: bool,
    pub concurrency: Option<usize>,
    pub registry: Option<String>,
    pub store_dir: Option<PathBuf>,
}

pub async fn run(project_dir: &Path, args: InstallArgs) -> Result<(), PkgError> {
    let settings = resolve_settings(
        project_dir,
        &SettingsOverrides {
            registry: args.registry,
            store_dir: args.store_dir,
            concurrency: args.concurrency,
        },
    )?;

    let registry = RegistryClient::from_settings(&settings)?;
    let store = Store::new(settings.store_dir.clone());

    let requirements = args
        .specs
        .iter()
        .map(|s| PackageSpec::parse(s))
        .collect::<Result<Vec<_>, _>>()?;

    let opts = InstallOptions {
        frozen: args.frozen_lockfile,
        concurrency: settings.concurrency,
        ..Default::default()
    };

    let report = install(project_dir, &store, &registry, &requirements, &opts).await?;

    if report.up_to_date {
        println!("Already up-to-date.");
    } else {
        println!(
            "Installed {} package(s) ({} downloaded, {} reused).",
            report.total, report.downloaded, report.reused
        );
    }
    Ok(())
}
