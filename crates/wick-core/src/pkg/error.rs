//! Installer error type.

use std::fmt;
use std::io;

/// Stable error codes, one per abstract failure kind.
pub mod codes {
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
    pub const RESOLUTION_ERROR: &str = "RESOLUTION_ERROR";
    pub const INTEGRITY_ERROR: &str = "INTEGRITY_ERROR";
    pub const ARCHIVE_ERROR: &str = "ARCHIVE_ERROR";
    pub const FILESYSTEM_ERROR: &str = "FILESYSTEM_ERROR";
    pub const LOCKFILE_ERROR: &str = "LOCKFILE_ERROR";
    pub const CANCELLED: &str = "CANCELLED";
}

/// Installer error: a stable code plus a human-readable message.
#[derive(Debug)]
pub struct PkgError {
    code: &'static str,
    message: String,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Connectivity, DNS, or non-2xx HTTP after retries.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(codes::NETWORK_ERROR, msg)
    }

    /// Malformed registry JSON or missing expected fields.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::new(codes::PROTOCOL_ERROR, msg)
    }

    /// No version satisfies a spec, or the spec itself is invalid.
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::new(codes::RESOLUTION_ERROR, msg)
    }

    /// Digest mismatch; the message names the algorithm.
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::new(codes::INTEGRITY_ERROR, msg)
    }

    /// Gzip/tar parse failure or an unsafe archive path.
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::new(codes::ARCHIVE_ERROR, msg)
    }

    /// Filesystem failure: permissions, space, symlink support.
    pub fn filesystem(msg: impl Into<String>) -> Self {
        Self::new(codes::FILESYSTEM_ERROR, msg)
    }

    /// Lockfile parse failure, missing referenced version, or missing roots.
    pub fn lockfile(msg: impl Into<String>) -> Self {
        Self::new(codes::LOCKFILE_ERROR, msg)
    }

    /// Caller-initiated cancellation or timeout.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(codes::CANCELLED, msg)
    }

    /// No version of `name` satisfies `spec`.
    #[must_use]
    pub fn no_matching_version(name: &str, spec: &str) -> Self {
        Self::resolution(format!("No version of {name} satisfies: {spec}"))
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::FILESYSTEM_ERROR, e.to_string())
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(codes::NETWORK_ERROR, format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::new(codes::NETWORK_ERROR, format!("Connection failed: {e}"))
        } else {
            Self::new(codes::NETWORK_ERROR, e.to_string())
        }
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(codes::PROTOCOL_ERROR, format!("Invalid JSON: {e}"))
    }
}
