//! Tarball download and extraction into the store.

use super::error::PkgError;
use super::registry::RegistryClient;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// Download a tarball, retrying transient failures.
///
/// # Errors
/// Returns an error if the download fails after retries or exceeds the
/// size limit.
pub async fn download_tarball(
    registry: &RegistryClient,
    url: &str,
    max_bytes: u64,
) -> Result<Bytes, PkgError> {
    let response = registry.get_retry(url, false).await?;

    if !response.status().is_success() {
        return Err(PkgError::network(format!(
            "Download failed with status {} for '{url}'",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(PkgError::archive(format!(
                "Tarball too large: {len} bytes (max: {max_bytes})"
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PkgError::network(format!("Failed to read response body: {e}")))?;

    if bytes.len() as u64 > max_bytes {
        return Err(PkgError::archive(format!(
            "Tarball too large: {} bytes (max: {max_bytes})",
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// Extract a gzipped tarball into `dest_dir` atomically.
///
/// Archive entries live under a single top-level directory (conventionally
/// `package/`); that leading segment is stripped, so `package/lib/a.js`
/// lands at `<dest>/lib/a.js`. Extraction goes to a sibling temp directory
/// first and is renamed into place, so a destination that exists is always
/// complete and concurrent extractions race benignly.
pub fn extract_tgz_atomic(bytes: &[u8], dest_dir: &Path) -> Result<(), PkgError> {
    if dest_dir.exists() {
        return Ok(());
    }

    let parent = dest_dir
        .parent()
        .ok_or_else(|| PkgError::archive("Destination has no parent"))?;
    fs::create_dir_all(parent)?;

    let temp_dir = parent.join(format!(
        ".tmp-{}-{}-{}",
        dest_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("pkg"),
        std::process::id(),
        rand_u32()
    ));
    if temp_dir.exists() {
        let _ = fs::remove_dir_all(&temp_dir);
    }
    fs::create_dir_all(&temp_dir)?;

    if let Err(e) = extract_tgz_to(bytes, &temp_dir) {
        let _ = fs::remove_dir_all(&temp_dir);
        return Err(e);
    }

    match fs::rename(&temp_dir, dest_dir) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Another process may have completed the same entry first.
            if dest_dir.exists() {
                let _ = fs::remove_dir_all(&temp_dir);
                return Ok(());
            }
            // Cross-filesystem rename fallback.
            if let Err(copy_err) = copy_dir_all(&temp_dir, dest_dir) {
                let _ = fs::remove_dir_all(&temp_dir);
                return Err(PkgError::filesystem(format!(
                    "Failed to move or copy extracted package: rename={e}, copy={copy_err}"
                )));
            }
            let _ = fs::remove_dir_all(&temp_dir);
            Ok(())
        }
    }
}

/// Strip the leading path segment of an archive entry and check the rest
/// is safe. Returns `None` for entries with no remainder (the top-level
/// directory itself).
fn stripped_entry_path(path: &Path) -> Result<Option<PathBuf>, PkgError> {
    if path.is_absolute() {
        return Err(PkgError::archive(format!(
            "Tarball contains absolute path: {}",
            path.display()
        )));
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(PkgError::archive(format!(
                "Tarball contains unsafe path: {}",
                path.display()
            )));
        }
    }

    let mut components = path.components();
    components.next();
    let rest = components.as_path();
    if rest.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(rest.to_path_buf()))
}

fn extract_tgz_to(bytes: &[u8], dest: &Path) -> Result<(), PkgError> {
    let gz = GzDecoder::new(bytes);
    let mut archive = Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|e| PkgError::archive(format!("Failed to read tarball entries: {e}")))?
    {
        let mut entry =
            entry.map_err(|e| PkgError::archive(format!("Failed to read tarball entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| PkgError::archive(format!("Failed to read entry path: {e}")))?
            .into_owned();

        let Some(rel) = stripped_entry_path(&path)? else {
            continue;
        };

        let dest_path = dest.join(&rel);
        if !dest_path.starts_with(dest) {
            return Err(PkgError::archive(format!(
                "Tarball entry escapes destination: {}",
                path.display()
            )));
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            let mut file = File::create(&dest_path)?;
            io::copy(&mut entry, &mut file)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    let perms = fs::Permissions::from_mode(mode);
                    let _ = fs::set_permissions(&dest_path, perms);
                }
            }
        } else if entry_type.is_symlink() {
            // Best-effort: the link itself stays inside dest, its target is
            // taken verbatim.
            #[cfg(unix)]
            if let Ok(Some(target)) = entry.link_name() {
                let _ = std::os::unix::fs::symlink(&target, &dest_path);
            }
        }
        // Other entry types (devices, fifos) are ignored.
    }

    Ok(())
}

fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if ty.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else if ty.is_file() {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn rand_u32() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
    );
    hasher.finish() as u32
}
