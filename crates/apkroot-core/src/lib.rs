//! Materialize Alpine and Wolfi packages into a root filesystem.
//!
//! The pipeline is: signing keys ([`keys`]) → signed repository indexes
//! ([`index`]) → dependency resolution ([`resolver`]) → fetch, unpack and
//! apply each package ([`materialize`]) into a [`rootfs::RootFs`].
//! [`pipeline`] ties the stages together as `build`, `scan` and `debug`.

pub mod apkdb;
pub mod archive;
pub mod context;
pub mod error;
pub mod index;
pub mod io;
pub mod keys;
pub mod materialize;
pub mod options;
pub mod paths;
pub mod pipeline;
pub mod reporter;
pub mod resolver;
pub mod rootfs;
pub mod scripts;

pub use archive::ScriptKind;
pub use context::Context;
pub use error::{Error, Result};
pub use options::{BuildOptions, ConflictPolicy, TriggerPolicy};
pub use pipeline::{BuildOutcome, DebugReport, ScanFormat, ScanReport, build, debug, scan};
pub use reporter::{NullReporter, Reporter};
pub use resolver::{Conflict, ConflictReason, Resolution};
pub use scripts::{ChrootRunner, ScriptRunner};

/// User Agent string for HTTP requests
pub const USER_AGENT: &str = concat!("apkroot/", env!("CARGO_PKG_VERSION"));
