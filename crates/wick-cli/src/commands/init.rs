//! `wick init` command.

use std::path::{Path, PathBuf};
use wick_core::config::{init_project_config, ProjectConfig, CONFIG_FILE};
use wick_core::pkg::PkgError;

pub fn run(
    project_dir: &Path,
    registry: Option<String>,
    store_dir: Option<PathBuf>,
    concurrency: Option<usize>,
) -> Result<(), PkgError> {
    let cfg = ProjectConfig {
        registry,
        store_dir,
        concurrency,
    };

    if init_project_config(project_dir, &cfg)? {
        println!("Created {CONFIG_FILE}");
    } else {
        println!("{CONFIG_FILE} already exists");
    }
    Ok(())
}
