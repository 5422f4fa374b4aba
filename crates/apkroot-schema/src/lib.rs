//! Wire types shared by the apkroot crates.
//!
//! Everything here is pure data plus parsing: no I/O, no async.

pub mod arch;
pub mod depend;
pub mod distro;
pub mod index;
pub mod releases;
pub mod types;
pub mod version;

// Re-exports
pub use arch::Arch;
pub use depend::{Constraint, Dependency, Provide};
pub use distro::{Distribution, KeySource, RepositoryRef, index_url};
pub use index::{IndexError, PackageDescriptor, PackageIndex};
pub use releases::{ReleaseBranch, Releases, RepositoryKey};
pub use types::*;
pub use version::{Op, VersionError};

/// File name of the package index inside the index archive.
pub const APKINDEX_FILE: &str = "APKINDEX";
