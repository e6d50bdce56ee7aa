//! Project configuration and settings resolution.
//!
//! Settings come from four layers with fixed precedence:
//! command-line flag > environment variable > `wick.json` > built-in default.

use crate::paths;
use crate::pkg::error::PkgError;
use crate::pkg::registry::DEFAULT_REGISTRY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project config filename.
pub const CONFIG_FILE: &str = "wick.json";

/// Environment variable overriding the registry base URL.
pub const REGISTRY_ENV: &str = "WICK_REGISTRY";
/// Environment variable overriding the store directory.
pub const STORE_DIR_ENV: &str = "WICK_STORE_DIR";
/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "WICK_CACHE_DIR";
/// Environment variable setting the registry disk-cache TTL in seconds.
pub const CACHE_TTL_ENV: &str = "WICK_CACHE_TTL_SECONDS";

/// Contents of an optional `wick.json` at the project root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// Registry base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Store directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,
    /// Worker count for parallel fetch/extract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

/// Load `wick.json` from the project directory.
///
/// A missing or malformed file yields the default (empty) config.
#[must_use]
pub fn load_project_config(project_dir: &Path) -> ProjectConfig {
    let path = project_dir.join(CONFIG_FILE);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return ProjectConfig::default();
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed wick.json");
        ProjectConfig::default()
    })
}

/// Write a default `wick.json` unless one already exists.
///
/// Returns `true` if the file was written, `false` if one was already there.
pub fn init_project_config(project_dir: &Path, cfg: &ProjectConfig) -> Result<bool, PkgError> {
    let path = project_dir.join(CONFIG_FILE);
    if path.exists() {
        return Ok(false);
    }
    std::fs::create_dir_all(project_dir)?;
    let mut body = serde_json::to_string_pretty(cfg)
        .map_err(|e| PkgError::filesystem(format!("Failed to serialize config: {e}")))?;
    body.push('\n');
    wick_util::fs::atomic_write(&path, body.as_bytes())?;
    Ok(true)
}

/// Command-line overrides for settings resolution.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub registry: Option<String>,
    pub store_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
}

/// Fully resolved settings threaded through the installer.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Registry base URL.
    pub registry: String,
    /// Package store root.
    pub store_dir: PathBuf,
    /// Cache root; registry documents go under `registry/` inside it.
    pub cache_dir: PathBuf,
    /// Registry disk-cache TTL in seconds. `None` = unset (cache valid
    /// indefinitely), `0` = disabled, positive = max age.
    pub cache_ttl: Option<i64>,
    /// Worker count for parallel fetch/extract.
    pub concurrency: usize,
}

/// Resolve effective settings for a project.
pub fn resolve_settings(
    project_dir: &Path,
    overrides: &SettingsOverrides,
) -> Result<Settings, PkgError> {
    let file = load_project_config(project_dir);

    let registry = overrides
        .registry
        .clone()
        .or_else(|| std::env::var(REGISTRY_ENV).ok().filter(|s| !s.is_empty()))
        .or(file.registry)
        .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());

    let store_dir = match overrides
        .store_dir
        .clone()
        .or_else(|| std::env::var(STORE_DIR_ENV).ok().map(PathBuf::from))
        .or(file.store_dir)
    {
        Some(dir) => dir,
        None => paths::default_store_dir()?,
    };

    let cache_dir = match std::env::var(CACHE_DIR_ENV).ok().map(PathBuf::from) {
        Some(dir) => dir,
        None => paths::default_cache_dir()?,
    };

    let cache_ttl = std::env::var(CACHE_TTL_ENV)
        .ok()
        .and_then(|v| v.parse::<i64>().ok());

    let concurrency = overrides
        .concurrency
        .or(file.concurrency)
        .filter(|&n| n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        });

    Ok(Settings {
        registry,
        store_dir,
        cache_dir,
        cache_ttl,
        concurrency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempdir().unwrap();
        let cfg = load_project_config(dir.path());
        assert_eq!(cfg, ProjectConfig::default());
    }

    #[test]
    fn test_malformed_config_is_default() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "not json {{{").unwrap();
        let cfg = load_project_config(dir.path());
        assert_eq!(cfg, ProjectConfig::default());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let cfg = ProjectConfig {
            registry: Some("https://registry.example.com/".to_string()),
            store_dir: Some(PathBuf::from("/tmp/store")),
            concurrency: Some(8),
        };
        assert!(init_project_config(dir.path(), &cfg).unwrap());
        assert_eq!(load_project_config(dir.path()), cfg);
    }

    #[test]
    fn test_init_does_not_overwrite() {
        let dir = tempdir().unwrap();
        let first = ProjectConfig {
            registry: Some("https://first.example.com/".to_string()),
            ..Default::default()
        };
        assert!(init_project_config(dir.path(), &first).unwrap());
        assert!(!init_project_config(dir.path(), &ProjectConfig::default()).unwrap());
        assert_eq!(load_project_config(dir.path()), first);
    }

    #[test]
    fn test_flag_beats_config_file() {
        let dir = tempdir().unwrap();
        let file_cfg = ProjectConfig {
            registry: Some("https://from-file.example.com/".to_string()),
            concurrency: Some(2),
            ..Default::default()
        };
        init_project_config(dir.path(), &file_cfg).unwrap();

        let overrides = SettingsOverrides {
            registry: Some("https://from-flag.example.com/".to_string()),
            store_dir: Some(dir.path().join("store")),
            ..Default::default()
        };
        let settings = resolve_settings(dir.path(), &overrides).unwrap();
        assert_eq!(settings.registry, "https://from-flag.example.com/");
        assert_eq!(settings.store_dir, dir.path().join("store"));
        // Concurrency still comes from the file
        assert_eq!(settings.concurrency, 2);
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let dir = tempdir().unwrap();
        let settings = resolve_settings(dir.path(), &SettingsOverrides::default()).unwrap();
        assert_eq!(settings.registry, DEFAULT_REGISTRY);
        assert!(settings.concurrency > 0);
    }
}
