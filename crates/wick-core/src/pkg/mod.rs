//! Package installer internals.
//!
//! Provides:
//! - Parsing package specifications (name@spec)
//! - Fetching registry root documents with a layered cache
//! - Resolving version ranges using semver
//! - Expanding the transitive dependency graph
//! - Downloading, verifying and extracting tarballs into the store
//! - Wiring isolated `node_modules` symlink trees
//! - Deterministic lockfile generation and lockfile-driven installs

pub mod error;
pub mod graph;
pub mod install;
pub mod integrity;
pub mod lockfile;
pub mod registry;
pub mod spec;
pub mod store;
pub mod tarball;
pub mod version;

pub use error::{codes, PkgError};
pub use graph::{build_graph, build_graphs, Node};
pub use install::{install, InstallOptions, InstallReport};
pub use lockfile::{Lockfile, LockPackage, UpdatePolicy, LOCKFILE_NAME};
pub use registry::{RegistryClient, RootDoc, VersionMeta, DEFAULT_REGISTRY};
pub use spec::PackageSpec;
pub use store::Store;
pub use tarball::{download_tarball, extract_tgz_atomic, MAX_TARBALL_SIZE};
pub use version::resolve_version;
