//! `wick remove` command.

use std::path::Path;
use tracing::warn;
use wick_core::pkg::{lockfile, store, PkgError};

pub fn run(project_dir: &Path, names: &[String]) -> Result<(), PkgError> {
    store::unlink_roots(project_dir, names);

    // Keep the lockfile consistent: drop the roots and prune everything
    // no longer reachable. A project without a lockfile is not an error.
    match lockfile::remove(project_dir, names) {
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Failed to update lockfile"),
    }

    println!("Removed: {}", names.join(", "));
    Ok(())
}
