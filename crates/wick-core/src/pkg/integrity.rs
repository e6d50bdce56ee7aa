//! Tarball integrity verification.
//!
//! Checks a downloaded archive against the registry's Subresource-Integrity
//! string (`sha512-<base64>` preferred, `sha1-<base64>` fallback) or the
//! legacy hex `shasum`. When any `sha512` token is present it is
//! authoritative: a malformed one fails verification rather than falling
//! back to a weaker digest.

use super::error::PkgError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::Sha1;
use sha2::{Digest, Sha512};

/// Verify archive bytes against the version's integrity metadata.
///
/// With neither an integrity string nor a shasum, verification is
/// unenforced and the bytes pass.
pub fn verify(
    key: &str,
    bytes: &[u8],
    integrity: Option<&str>,
    shasum: Option<&str>,
) -> Result<(), PkgError> {
    if let Some(sri) = integrity.filter(|s| !s.trim().is_empty()) {
        return verify_sri(key, bytes, sri, shasum);
    }

    if let Some(expected) = shasum.filter(|s| !s.trim().is_empty()) {
        return verify_shasum(key, bytes, expected);
    }

    Ok(())
}

fn verify_sri(key: &str, bytes: &[u8], sri: &str, shasum: Option<&str>) -> Result<(), PkgError> {
    let tokens: Vec<&str> = sri.split_whitespace().collect();

    let sha512_digests = decode_tokens(key, &tokens, "sha512")?;
    if !sha512_digests.is_empty() {
        let actual = Sha512::digest(bytes);
        if sha512_digests.iter().any(|d| d[..] == actual[..]) {
            return Ok(());
        }
        return Err(PkgError::integrity(format!(
            "sha512 mismatch for {key}"
        )));
    }

    let sha1_digests = decode_tokens(key, &tokens, "sha1")?;
    if !sha1_digests.is_empty() {
        let actual = Sha1::digest(bytes);
        if sha1_digests.iter().any(|d| d[..] == actual[..]) {
            return Ok(());
        }
        return Err(PkgError::integrity(format!("sha1 mismatch for {key}")));
    }

    // Only unsupported algorithms in the SRI string; the legacy shasum is
    // the last resort.
    if let Some(expected) = shasum.filter(|s| !s.trim().is_empty()) {
        return verify_shasum(key, bytes, expected);
    }
    Ok(())
}

/// Decode every `<algo>-<base64>` token for one algorithm. A token that
/// names the algorithm but fails base64 decoding is an error, not a
/// fallback signal.
fn decode_tokens(key: &str, tokens: &[&str], algo: &str) -> Result<Vec<Vec<u8>>, PkgError> {
    let mut digests = Vec::new();
    for token in tokens {
        let Some(payload) = token.strip_prefix(algo).and_then(|t| t.strip_prefix('-')) else {
            continue;
        };
        let digest = BASE64.decode(payload).map_err(|e| {
            PkgError::integrity(format!("Malformed {algo} integrity for {key}: {e}"))
        })?;
        digests.push(digest);
    }
    Ok(digests)
}

fn verify_shasum(key: &str, bytes: &[u8], expected: &str) -> Result<(), PkgError> {
    let actual = hex::encode(Sha1::digest(bytes));
    if actual == expected.trim().to_lowercase() {
        Ok(())
    } else {
        Err(PkgError::integrity(format!(
            "sha1 shasum mismatch for {key}"
        )))
    }
}
