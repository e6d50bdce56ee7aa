//! Default filesystem locations for the store and registry cache.

use crate::pkg::error::PkgError;
use std::path::PathBuf;

/// Store layout version. Bumped when the on-disk store format changes.
const STORE_VERSION: u32 = 3;

fn wick_home() -> Result<PathBuf, PkgError> {
    dirs_next::home_dir()
        .map(|home| home.join(".wick"))
        .ok_or_else(|| PkgError::filesystem("Cannot determine home directory"))
}

/// Default package store: `~/.wick/store/v3`.
pub fn default_store_dir() -> Result<PathBuf, PkgError> {
    Ok(wick_home()?.join("store").join(format!("v{STORE_VERSION}")))
}

/// Default cache root: `~/.wick/cache`. Registry documents live under
/// `registry/` inside it.
pub fn default_cache_dir() -> Result<PathBuf, PkgError> {
    Ok(wick_home()?.join("cache"))
}
