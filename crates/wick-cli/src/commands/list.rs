//! `wick list` command.

use std::path::Path;
use wick_core::pkg::{lockfile, Lockfile, PkgError};

pub fn run(project_dir: &Path, format: &str) -> Result<(), PkgError> {
    let lf = Lockfile::read_from(&lockfile::lockfile_path(project_dir))?;

    match format {
        "json" => print_json(&lf)?,
        "yaml" => print_yaml(&lf),
        _ => print_table(&lf),
    }
    Ok(())
}

fn print_table(lf: &Lockfile) {
    println!("Roots:");
    let mut roots = lf.roots.clone();
    roots.sort();
    for root in &roots {
        println!("  {root}");
    }
    println!("Packages:");
    for key in lf.packages.keys() {
        println!("  {key}");
    }
}

fn print_json(lf: &Lockfile) -> Result<(), PkgError> {
    let out = serde_json::to_string_pretty(lf)
        .map_err(|e| PkgError::lockfile(format!("Failed to serialize lockfile: {e}")))?;
    println!("{out}");
    Ok(())
}

fn print_yaml(lf: &Lockfile) {
    println!("roots:");
    for root in &lf.roots {
        println!("- {root}");
    }
    println!("packages:");
    for (key, pkg) in &lf.packages {
        println!("  {key}:");
        println!("    name: {}", pkg.name);
        println!("    version: {}", pkg.version);
        if !pkg.dependencies.is_empty() {
            println!("    dependencies:");
            for (dep, version) in &pkg.dependencies {
                println!("      {dep}: {version}");
            }
        }
    }
}
