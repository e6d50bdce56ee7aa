//! Registry client with layered root-document caching.
//!
//! Reads go through three layers in order: an in-memory map shared for the
//! life of the process, an on-disk JSON cache with TTL semantics, and
//! finally the network. Transient HTTP failures retry with doubling
//! backoff.

use super::error::PkgError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// First retry delay; doubles per attempt.
const BACKOFF_BASE: Duration = Duration::from_millis(300);

/// Total HTTP attempts per request.
const MAX_ATTEMPTS: u32 = 3;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Distribution record of one published version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    /// Tarball URL.
    #[serde(default)]
    pub tarball: String,
    /// Subresource-Integrity string (`sha512-...`, `sha1-...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    /// Legacy hex SHA-1 of the tarball.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
}

/// Metadata of one published version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Direct dependencies: name -> range/exact/tag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dist: Dist,
}

/// The registry's full document for one package: every published version
/// plus the dist-tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootDoc {
    #[serde(default, rename = "dist-tags")]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionMeta>,
}

impl RootDoc {
    /// The version the `latest` dist-tag points at.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get("latest").map(String::as_str)
    }
}

/// Registry client for fetching root documents and tarballs.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: reqwest::Client,
    /// `<cache>/registry` directory for on-disk documents.
    cache_dir: PathBuf,
    /// Disk-cache TTL in seconds. `None`/negative = valid indefinitely,
    /// `0` = disk cache disabled, positive = max age.
    ttl: Option<i64>,
    mem: Arc<RwLock<HashMap<String, Arc<RootDoc>>>>,
}

impl RegistryClient {
    /// Create a client for the given base URL and cache root.
    pub fn new(base_url: &str, cache_root: &std::path::Path, ttl: Option<i64>) -> Result<Self, PkgError> {
        // A trailing slash makes Url::join treat the last segment as a
        // directory.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| PkgError::network(format!("Invalid registry URL '{base_url}': {e}")))?;

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("wick/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            cache_dir: cache_root.join("registry"),
            ttl,
            mem: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Create a client from resolved settings.
    pub fn from_settings(settings: &crate::config::Settings) -> Result<Self, PkgError> {
        Self::new(&settings.registry, &settings.cache_dir, settings.cache_ttl)
    }

    /// On-disk cache file for a package's root document. The `/` in a
    /// scoped name is escaped in the file name only.
    #[must_use]
    pub fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name.replace('/', "%2F")))
    }

    /// Fetch the root document for `name`, consulting caches first.
    pub async fn get_root_doc(&self, name: &str) -> Result<Arc<RootDoc>, PkgError> {
        if let Some(doc) = self.mem.read().await.get(name) {
            return Ok(Arc::clone(doc));
        }

        if self.disk_cache_usable(name) {
            if let Some(doc) = self.read_disk_cache(name) {
                debug!(name, "Using cached root document");
                let doc = Arc::new(doc);
                self.mem
                    .write()
                    .await
                    .insert(name.to_string(), Arc::clone(&doc));
                return Ok(doc);
            }
        }

        match self.fetch_remote(name).await {
            Ok((doc, body)) => {
                self.write_disk_cache(name, &body);
                let doc = Arc::new(doc);
                self.mem
                    .write()
                    .await
                    .insert(name.to_string(), Arc::clone(&doc));
                Ok(doc)
            }
            Err(e) => {
                // With an indefinite TTL a stale-looking disk copy is still
                // acceptable when the registry is unreachable.
                if self.ttl.map_or(true, |t| t < 0) {
                    if let Some(doc) = self.read_disk_cache(name) {
                        warn!(name, error = %e, "Registry unreachable, using disk cache");
                        let doc = Arc::new(doc);
                        self.mem
                            .write()
                            .await
                            .insert(name.to_string(), Arc::clone(&doc));
                        return Ok(doc);
                    }
                }
                Err(e)
            }
        }
    }

    fn disk_cache_usable(&self, name: &str) -> bool {
        let path = self.cache_path(name);
        match self.ttl {
            Some(0) => false,
            Some(ttl) if ttl > 0 => {
                let Ok(meta) = std::fs::metadata(&path) else {
                    return false;
                };
                let Ok(mtime) = meta.modified() else {
                    return false;
                };
                SystemTime::now()
                    .duration_since(mtime)
                    .is_ok_and(|age| age.as_secs() <= ttl.unsigned_abs())
            }
            // Unset or negative: valid indefinitely.
            _ => path.is_file(),
        }
    }

    fn read_disk_cache(&self, name: &str) -> Option<RootDoc> {
        let path = self.cache_path(name);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(doc) => Some(doc),
            Err(e) => {
                // Corrupt cache entries are not fatal; fall through to the
                // network.
                debug!(path = %path.display(), error = %e, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    fn write_disk_cache(&self, name: &str, body: &str) {
        if self.ttl == Some(0) {
            return;
        }
        let path = self.cache_path(name);
        if let Err(e) = std::fs::create_dir_all(&self.cache_dir)
            .and_then(|()| wick_util::fs::atomic_write(&path, body.as_bytes()))
        {
            warn!(path = %path.display(), error = %e, "Failed to write registry cache");
        }
    }

    async fn fetch_remote(&self, name: &str) -> Result<(RootDoc, String), PkgError> {
        // Scoped names keep their literal @ and /; the registry accepts
        // them as-is.
        let url = self
            .base_url
            .join(name)
            .map_err(|e| PkgError::network(format!("Failed to build URL for '{name}': {e}")))?;

        let response = self.get_retry(url.as_str(), true).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PkgError::network(format!(
                "Registry returned status {status} for '{name}'"
            )));
        }

        let body = response.text().await?;
        let doc: RootDoc = serde_json::from_str(&body)
            .map_err(|e| PkgError::protocol(format!("Malformed root document for '{name}': {e}")))?;
        Ok((doc, body))
    }

    /// GET with retry on connection errors, 429 and 5xx. Backoff starts at
    /// 300 ms and doubles per attempt.
    pub(crate) async fn get_retry(
        &self,
        url: &str,
        json: bool,
    ) -> Result<reqwest::Response, PkgError> {
        let mut attempt: u32 = 0;
        loop {
            let mut request = self.http.get(url);
            if json {
                request = request.header("Accept", "application/json");
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status != reqwest::StatusCode::TOO_MANY_REQUESTS
                        && !status.is_server_error()
                    {
                        return Ok(response);
                    }
                    debug!(url, %status, attempt, "Retryable HTTP status");
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    debug!(url, error = %e, attempt, "Retryable HTTP error");
                }
                Err(e) => return Err(e.into()),
            }

            attempt += 1;
            if attempt >= MAX_ATTEMPTS {
                return Err(PkgError::network(format!(
                    "Request failed after {attempt} attempts: {url}"
                )));
            }
            tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
        }
    }
}
