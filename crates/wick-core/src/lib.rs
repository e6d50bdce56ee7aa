#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

//! Core library for the wick package installer.
//!
//! Resolves semver ranges against npm registry root documents, expands the
//! transitive dependency graph, fetches and verifies tarballs into a shared
//! store, and wires isolated `node_modules` symlink trees from a
//! deterministic lockfile.

pub mod config;
pub mod paths;
pub mod pkg;

/// Tool version, from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
