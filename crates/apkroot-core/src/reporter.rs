//! Reporter trait for dependency injection
//!
//! This trait allows core logic to report progress and status without
//! being coupled to a specific terminal implementation.

use apkroot_schema::{PackageName, Version};

use crate::archive::ScriptKind;

/// Progress sink for a build.
pub trait Reporter: Send + Sync {
    /// Indicates a new section or phase has started (e.g. "Resolving", "Installing").
    fn section(&self, title: &str);

    /// Updates the progress of a package download.
    fn fetching(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>);

    /// A package archive is being unpacked into scratch space.
    fn unpacking(&self, name: &PackageName, version: &Version);

    /// A package payload is being merged into the root.
    fn installing(&self, name: &PackageName, version: &Version);

    /// A lifecycle script is about to run.
    fn script(&self, name: &PackageName, version: &Version, kind: ScriptKind);

    /// Marks a package operation as successfully completed.
    fn done(&self, name: &PackageName, version: &Version, detail: &str, size: Option<u64>);

    /// Marks a package operation as failed with a specific reason.
    fn failed(&self, name: &PackageName, version: &Version, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn fetching(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>) {
        (**self).fetching(name, version, current, total);
    }
    fn unpacking(&self, name: &PackageName, version: &Version) {
        (**self).unpacking(name, version);
    }
    fn installing(&self, name: &PackageName, version: &Version) {
        (**self).installing(name, version);
    }
    fn script(&self, name: &PackageName, version: &Version, kind: ScriptKind) {
        (**self).script(name, version, kind);
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str, size: Option<u64>) {
        (**self).done(name, version, detail, size);
    }
    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).failed(name, version, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., scans, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn fetching(&self, _: &PackageName, _: &Version, _: u64, _: Option<u64>) {}
    fn unpacking(&self, _: &PackageName, _: &Version) {}
    fn installing(&self, _: &PackageName, _: &Version) {}
    fn script(&self, _: &PackageName, _: &Version, _: ScriptKind) {}
    fn done(&self, _: &PackageName, _: &Version, _: &str, _: Option<u64>) {}
    fn failed(&self, _: &PackageName, _: &Version, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
