//! Build, scan and debug: the three entry points of the library.
//!
//! All three share the same front half (keys, indexes, resolution). Only
//! `build` and `debug` go on to materialize a root.

use std::fs;
use std::path::{Path, PathBuf};

use apkroot_schema::{Arch, Distribution, PackageIndex};
use comfy_table::presets::NOTHING;
use comfy_table::{CellAlignment, Table};
use serde::Serialize;
use tracing::{info, warn};

use crate::apkdb::ApkDatabase;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::index::fetch_indexes;
use crate::keys::{Keyring, get_keys};
use crate::materialize::{MaterializeOptions, PackageReport, materialize};
use crate::options::{BuildOptions, ConflictPolicy};
use crate::paths;
use crate::resolver::{Conflict, Resolution, resolve};
use crate::rootfs::RootFs;

/// Keys, indexes and the resolved package set for one request.
#[derive(Debug)]
pub struct Plan {
    /// Target architecture.
    pub arch: Arch,
    /// Base packages followed by the requested names.
    pub request: Vec<String>,
    /// Repository URIs in fetch order.
    pub repositories: Vec<String>,
    /// Trusted keys.
    pub keys: Keyring,
    /// Indexes in fetch order.
    pub indexes: Vec<PackageIndex>,
    /// Packages in install order plus conflicts.
    pub resolution: Resolution,
}

/// Fetch keys and indexes and resolve `packages`.
///
/// # Errors
///
/// Key, index and resolution failures.
pub async fn plan(ctx: &Context, packages: &[String], options: &BuildOptions) -> Result<Plan> {
    let arch = options.target_arch();
    let request = options.request(packages);
    let repositories = options.repositories();

    ctx.reporter.section("Fetching keys");
    let keys = get_keys(ctx, &options.key_source(), arch).await?;

    ctx.reporter.section("Fetching indexes");
    let indexes = fetch_indexes(ctx, &repositories, &keys, arch).await?;

    ctx.reporter.section("Resolving");
    let resolution = resolve(&request, &indexes)?;
    info!(
        requested = request.len(),
        resolved = resolution.packages.len(),
        conflicts = resolution.conflicts.len(),
        "resolved request"
    );

    Ok(Plan {
        arch,
        request,
        repositories,
        keys,
        indexes,
        resolution,
    })
}

/// A finished root filesystem.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    /// Where the root ended up.
    pub root: PathBuf,
    /// Installed packages in install order.
    pub packages: Vec<PackageReport>,
    /// Conflicts that were let through.
    pub conflicts: Vec<Conflict>,
}

/// Materialize `packages` (plus base packages) into `output`.
///
/// The root is assembled in a staging directory next to `output` and only
/// renamed into place once every package is installed; on failure nothing
/// is left at `output`.
///
/// # Errors
///
/// Any key, index, resolution or materialization failure.
/// [`Error::Conflicts`] under [`ConflictPolicy::Abort`]. [`Error::Config`]
/// if `output` exists and is not an empty directory.
pub async fn build(
    ctx: &Context,
    packages: &[String],
    output: &Path,
    options: &BuildOptions,
) -> Result<BuildOutcome> {
    check_output(output)?;

    let plan = plan(ctx, packages, options).await?;
    let conflicts = apply_conflict_policy(ctx, &plan.resolution, options.conflict_policy)?;

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".apkroot-")
        .tempdir_in(&parent)?;

    let root = RootFs::create(staging.path().join("root"))?;
    if let Some(base) = &options.base {
        let stats = root.seed(base)?;
        info!(base = %base.display(), files = stats.files.len(), "seeded root");
    }

    let debug_dir = if options.keep_debug_copies {
        Some(match &options.debug_dir {
            Some(dir) => dir.clone(),
            None => paths::debug_path()?,
        })
    } else {
        None
    };

    let reports = materialize(
        ctx,
        &plan.resolution.packages,
        &root,
        &staging.path().join("scratch"),
        &MaterializeOptions {
            concurrency: options.jobs(),
            trigger_policy: options.trigger_policy,
            debug_dir,
        },
    )
    .await?;

    if options.write_apk_db {
        ApkDatabase {
            world: &plan.request,
            repositories: &plan.repositories,
            arch: plan.arch,
            keys: &plan.keys,
            packages: &reports,
        }
        .write(root.path())?;
    }

    check_output(output)?;
    if output.exists() {
        fs::remove_dir(output)?;
    }
    fs::rename(root.path(), output)?;
    info!(root = %output.display(), packages = reports.len(), "root filesystem ready");

    Ok(BuildOutcome {
        root: output.to_path_buf(),
        packages: reports,
        conflicts,
    })
}

/// `output` must be absent or an empty directory.
fn check_output(output: &Path) -> Result<()> {
    match fs::read_dir(output) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                Err(Error::Config(format!(
                    "output {} exists and is not empty",
                    output.display()
                )))
            } else {
                Ok(())
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(_) if output.exists() => Err(Error::Config(format!(
            "output {} exists and is not a directory",
            output.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

fn apply_conflict_policy(
    ctx: &Context,
    resolution: &Resolution,
    policy: ConflictPolicy,
) -> Result<Vec<Conflict>> {
    if resolution.conflicts.is_empty() {
        return Ok(Vec::new());
    }
    match policy {
        ConflictPolicy::Abort => Err(Error::Conflicts(resolution.conflicts.clone())),
        ConflictPolicy::Proceed => {
            for conflict in &resolution.conflicts {
                warn!(%conflict, "conflicting packages, installing both");
                ctx.reporter.warning(&format!("conflict: {conflict}"));
            }
            Ok(resolution.conflicts.clone())
        }
    }
}

/// How to render a [`ScanReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// A plain text table, one package per row.
    Legacy,
}

/// One row of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEntry {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Package architecture, may be `noarch`.
    pub arch: String,
    /// Archive size in bytes.
    pub size: u64,
    /// Installed size in bytes.
    pub installed_size: u64,
    /// Archive URL.
    pub url: String,
    /// Origin (source) package.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// License expression.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub license: String,
}

/// What a build would install, without installing it.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Distribution preset used.
    pub distribution: Distribution,
    /// Target architecture.
    pub arch: Arch,
    /// Repository URIs in fetch order.
    pub repositories: Vec<String>,
    /// Packages in install order.
    pub packages: Vec<ScanEntry>,
    /// Conflicts in the resolved set.
    pub conflicts: Vec<Conflict>,
}

impl ScanReport {
    /// Total download size.
    pub fn total_size(&self) -> u64 {
        self.packages.iter().map(|p| p.size).sum()
    }

    /// Render the report.
    ///
    /// # Errors
    ///
    /// [`Error::Serialize`] if JSON encoding fails.
    pub fn render(&self, format: ScanFormat) -> Result<String> {
        match format {
            ScanFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            ScanFormat::Legacy => Ok(self.render_table()),
        }
    }

    fn render_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(NOTHING)
            .set_header(vec!["NAME", "VERSION", "ARCH", "SIZE", "ORIGIN"]);
        for pkg in &self.packages {
            table.add_row(vec![
                pkg.name.clone(),
                pkg.version.clone(),
                pkg.arch.clone(),
                pkg.size.to_string(),
                pkg.origin.clone().unwrap_or_default(),
            ]);
        }
        if let Some(column) = table.column_mut(3) {
            column.set_cell_alignment(CellAlignment::Right);
        }

        let mut out = table.to_string();
        out.push('\n');
        for conflict in &self.conflicts {
            out.push_str(&format!("conflict: {conflict}\n"));
        }
        out.push_str(&format!(
            "{} packages, {} bytes\n",
            self.packages.len(),
            self.total_size()
        ));
        out
    }
}

/// Resolve `packages` and report what a build would install.
///
/// # Errors
///
/// Key, index and resolution failures.
pub async fn scan(ctx: &Context, packages: &[String], options: &BuildOptions) -> Result<ScanReport> {
    let plan = plan(ctx, packages, options).await?;

    let entries = plan
        .resolution
        .packages
        .iter()
        .map(|p| ScanEntry {
            name: p.name.to_string(),
            version: p.version.to_string(),
            arch: p.arch.clone(),
            size: p.size,
            installed_size: p.installed_size,
            url: p.url.clone(),
            origin: p.origin.clone(),
            license: p.license.clone(),
        })
        .collect();

    Ok(ScanReport {
        distribution: options.distribution,
        arch: plan.arch,
        repositories: plan.repositories,
        packages: entries,
        conflicts: plan.resolution.conflicts,
    })
}

/// Per-package details of a debug build.
#[derive(Debug, Clone, Serialize)]
pub struct DebugReport {
    /// The assembled root.
    pub root: PathBuf,
    /// Where the per-package copies went.
    pub debug_dir: PathBuf,
    /// Installed packages with their scripts and debug copies.
    pub packages: Vec<PackageReport>,
    /// Conflicts that were let through.
    pub conflicts: Vec<Conflict>,
}

/// Build with a copy of every unpacked package kept for inspection.
///
/// # Errors
///
/// See [`build`].
pub async fn debug(
    ctx: &Context,
    packages: &[String],
    output: &Path,
    options: &BuildOptions,
) -> Result<DebugReport> {
    let debug_dir = match &options.debug_dir {
        Some(dir) => dir.clone(),
        None => paths::debug_path()?,
    };
    let options = BuildOptions {
        keep_debug_copies: true,
        debug_dir: Some(debug_dir.clone()),
        ..options.clone()
    };

    let outcome = build(ctx, packages, output, &options).await?;
    Ok(DebugReport {
        root: outcome.root,
        debug_dir,
        packages: outcome.packages,
        conflicts: outcome.conflicts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> ScanReport {
        ScanReport {
            distribution: Distribution::Alpine,
            arch: Arch::X86_64,
            repositories: vec!["https://r/v3.18/main".into()],
            packages: vec![
                ScanEntry {
                    name: "ca-certificates".into(),
                    version: "20230506-r0".into(),
                    arch: "noarch".into(),
                    size: 100,
                    installed_size: 300,
                    url: "https://r/v3.18/main/x86_64/ca-certificates-20230506-r0.apk".into(),
                    origin: None,
                    license: String::new(),
                },
                ScanEntry {
                    name: "curl".into(),
                    version: "8.1.2-r0".into(),
                    arch: "x86_64".into(),
                    size: 200,
                    installed_size: 500,
                    url: "https://r/v3.18/main/x86_64/curl-8.1.2-r0.apk".into(),
                    origin: Some("curl".into()),
                    license: "curl".into(),
                },
            ],
            conflicts: Vec::new(),
        }
    }

    #[test]
    fn test_render_json() {
        let json = report().render(ScanFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["distribution"], "alpine");
        assert_eq!(value["arch"], "x86_64");
        assert_eq!(value["packages"][1]["name"], "curl");
        assert!(value["packages"][0].get("origin").is_none());
    }

    #[test]
    fn test_render_legacy_table() {
        let text = report().render(ScanFormat::Legacy).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("NAME") && lines[0].contains("VERSION"));
        assert!(lines.iter().any(|l| l.contains("curl") && l.contains("8.1.2-r0")));
        assert!(text.ends_with("2 packages, 300 bytes\n"));
    }

    #[test]
    fn test_check_output() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_output(&dir.path().join("missing")).is_ok());
        assert!(check_output(dir.path()).is_ok());

        fs::write(dir.path().join("file"), "x").unwrap();
        assert!(matches!(check_output(dir.path()), Err(Error::Config(_))));
        assert!(matches!(
            check_output(&dir.path().join("file")),
            Err(Error::Config(_))
        ));
    }
}
