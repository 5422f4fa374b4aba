//! APK database files written into a finished root.
//!
//! With these in place `apk` run inside the root sees the packages as
//! installed: `etc/apk/world`, `etc/apk/repositories`, `etc/apk/arch`,
//! `etc/apk/keys/*` and `lib/apk/db/installed`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use apkroot_schema::{Arch, PackageDescriptor};
use tracing::debug;

use crate::error::Result;
use crate::keys::Keyring;
use crate::materialize::PackageReport;

/// Path of the installed database, relative to the root.
pub const INSTALLED_DB: &str = "lib/apk/db/installed";

/// Everything needed to describe a finished root to `apk`.
#[derive(Debug, Clone, Copy)]
pub struct ApkDatabase<'a> {
    /// Names the user asked for (`etc/apk/world`).
    pub world: &'a [String],
    /// Repository URIs in fetch order.
    pub repositories: &'a [String],
    /// Target architecture.
    pub arch: Arch,
    /// Trusted keys the indexes were verified with.
    pub keys: &'a Keyring,
    /// Installed packages in install order.
    pub packages: &'a [PackageReport],
}

impl ApkDatabase<'_> {
    /// Write the database files under `root`.
    ///
    /// # Errors
    ///
    /// Any filesystem failure.
    pub fn write(&self, root: &Path) -> Result<()> {
        let etc_apk = root.join("etc/apk");
        let keys_dir = etc_apk.join("keys");
        fs::create_dir_all(&keys_dir)?;

        fs::write(etc_apk.join("world"), lines(self.world))?;
        fs::write(etc_apk.join("repositories"), lines(self.repositories))?;
        fs::write(etc_apk.join("arch"), format!("{}\n", self.arch))?;
        for (name, pem) in self.keys {
            fs::write(keys_dir.join(name), pem)?;
        }

        let installed = root.join(INSTALLED_DB);
        if let Some(parent) = installed.parent() {
            fs::create_dir_all(parent)?;
        }
        let db: String = self.packages.iter().map(installed_record).collect();
        fs::write(&installed, db)?;

        debug!(
            root = %root.display(),
            packages = self.packages.len(),
            "wrote apk database"
        );
        Ok(())
    }
}

fn lines(items: &[String]) -> String {
    items.iter().map(|i| format!("{i}\n")).collect()
}

/// One `lib/apk/db/installed` record, blank line included.
pub fn installed_record(report: &PackageReport) -> String {
    let mut out = header(&report.descriptor);

    let mut dirs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for dir in &report.merged.directories {
        dirs.entry(dir.to_string_lossy().into_owned()).or_default();
    }
    for file in &report.merged.files {
        let parent = file
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(name) = file.file_name() else {
            continue;
        };
        dirs.entry(parent)
            .or_default()
            .insert(name.to_string_lossy().into_owned());
    }

    for (dir, files) in dirs {
        if !dir.is_empty() {
            out.push_str(&format!("F:{dir}\n"));
        }
        for file in files {
            out.push_str(&format!("R:{file}\n"));
        }
    }

    out.push('\n');
    out
}

fn header(pkg: &PackageDescriptor) -> String {
    let mut out = String::new();
    let mut field = |key: char, value: &str| {
        if !value.is_empty() {
            out.push_str(&format!("{key}:{value}\n"));
        }
    };

    field('C', pkg.checksum.as_deref().unwrap_or_default());
    field('P', &pkg.name);
    field('V', &pkg.version);
    field('A', &pkg.arch);
    field('S', &pkg.size.to_string());
    field('I', &pkg.installed_size.to_string());
    field('T', &pkg.description);
    field('U', &pkg.homepage);
    field('L', &pkg.license);
    field('o', pkg.origin.as_deref().unwrap_or_default());
    field('m', pkg.maintainer.as_deref().unwrap_or_default());
    field(
        't',
        &pkg.build_time.as_ref().map(ToString::to_string).unwrap_or_default(),
    );
    field('c', pkg.commit.as_deref().unwrap_or_default());
    field('k', &pkg.provider_priority.as_ref().map(ToString::to_string).unwrap_or_default());
    field('D', &join(&pkg.depends));
    field('p', &join(&pkg.provides));
    field('i', &join(&pkg.install_if));
    out
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
