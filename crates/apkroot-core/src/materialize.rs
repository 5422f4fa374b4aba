//! Package Materializer.
//!
//! Fetching and unpacking run concurrently (bounded), while applying a
//! package to the root is strictly sequential in install order:
//!
//! 1. `.pre-install` against the root as it is
//! 2. payload merge
//! 3. `.post-install`
//! 4. `.trigger`, only with [`TriggerPolicy::Run`]
//!
//! The first failure stops the build. Packages already applied stay in the
//! root; in-flight fetches are cancelled and waited for before returning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use apkroot_schema::PackageDescriptor;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::archive::{self, ScriptKind, UnpackedPackage};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::io::download::download_to_file;
use crate::options::TriggerPolicy;
use crate::rootfs::{self, MergeStats, RootFs};

/// Knobs for [`materialize`].
#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    /// Packages fetched and unpacked ahead of the one being applied.
    pub concurrency: usize,
    /// Trigger handling.
    pub trigger_policy: TriggerPolicy,
    /// If set, each unpacked tree is copied to `<dir>/<name>-<version>`.
    pub debug_dir: Option<PathBuf>,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            trigger_policy: TriggerPolicy::default(),
            debug_dir: None,
        }
    }
}

/// What happened to one package.
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    /// The installed package.
    pub descriptor: PackageDescriptor,
    /// Bytes downloaded.
    pub archive_size: u64,
    /// Lifecycle scripts the package ships.
    pub scripts: Vec<ScriptKind>,
    /// Lifecycle scripts that were executed, in order.
    pub scripts_run: Vec<ScriptKind>,
    /// Entries written to the root.
    pub merged: MergeStats,
    /// Top-level dotfiles that were dropped.
    pub metadata: Vec<String>,
    /// Location of the debug copy, if one was made.
    pub debug_copy: Option<PathBuf>,
}

struct Prepared {
    unpacked: UnpackedPackage,
    scratch: PathBuf,
    archive_size: u64,
}

/// Install `packages` (in install order) into `root`.
///
/// `scratch` holds one directory per package while it is in flight. No
/// task writes to it any more once this returns, whether it succeeds or
/// not.
///
/// # Errors
///
/// The first failure, wrapped in [`Error::Package`] with the package
/// and its URL. Cancellation is returned as [`Error::Cancelled`].
pub async fn materialize(
    ctx: &Context,
    packages: &[PackageDescriptor],
    root: &RootFs,
    scratch: &Path,
    options: &MaterializeOptions,
) -> Result<Vec<PackageReport>> {
    let started = Instant::now();
    let fetch_ctx = ctx.child();
    let _cancel_on_exit = fetch_ctx.cancel.clone().drop_guard();

    ctx.reporter.section("Installing");

    let mut tasks = JoinSet::new();
    let installed = install_all(ctx, &fetch_ctx, &mut tasks, packages, root, scratch, options).await;

    // Unpacking runs on blocking threads and cannot be aborted, so wait for
    // every outstanding task to see the cancellation and finish.
    fetch_ctx.cancel.cancel();
    while tasks.join_next().await.is_some() {}

    let reports = installed?;
    ctx.reporter
        .summary(reports.len(), "installed", started.elapsed().as_secs_f64());
    info!(packages = reports.len(), root = %root.path().display(), "materialized");
    Ok(reports)
}

type PrepareTasks = JoinSet<(usize, Result<Prepared>)>;

/// Keep up to `concurrency` packages fetching ahead of the one being
/// applied and apply them strictly in order.
async fn install_all(
    ctx: &Context,
    fetch_ctx: &Context,
    tasks: &mut PrepareTasks,
    packages: &[PackageDescriptor],
    root: &RootFs,
    scratch: &Path,
    options: &MaterializeOptions,
) -> Result<Vec<PackageReport>> {
    let window = options.concurrency.max(1);
    let mut spawned = 0;
    let mut ready: HashMap<usize, Result<Prepared>> = HashMap::new();
    let mut reports = Vec::with_capacity(packages.len());

    for (position, descriptor) in packages.iter().enumerate() {
        while spawned < packages.len() && spawned < position + window {
            let next = packages[spawned].clone();
            let dir = scratch.join(next.id());
            tasks.spawn(prepare_at(spawned, fetch_ctx.clone(), next, dir));
            spawned += 1;
        }

        let prepared = loop {
            if let Some(prepared) = ready.remove(&position) {
                break prepared;
            }
            match tasks.join_next().await {
                Some(Ok((index, prepared))) => {
                    ready.insert(index, prepared);
                }
                Some(Err(e)) => {
                    return Err(Error::from(e).for_package(&descriptor.id(), &descriptor.url));
                }
                None => return Err(Error::Cancelled),
            }
        }?;

        match apply(ctx, root, prepared, options).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                ctx.reporter
                    .failed(&descriptor.name, &descriptor.version, &e.to_string());
                return Err(e.for_package(&descriptor.id(), &descriptor.url));
            }
        }
    }
    Ok(reports)
}

async fn prepare_at(
    position: usize,
    ctx: Context,
    descriptor: PackageDescriptor,
    dir: PathBuf,
) -> (usize, Result<Prepared>) {
    let id = descriptor.id();
    let url = descriptor.url.clone();
    let prepared = prepare(ctx, descriptor, dir)
        .await
        .map_err(|e| e.for_package(&id, &url));
    (position, prepared)
}

/// Download and unpack one package into its scratch directory.
async fn prepare(ctx: Context, descriptor: PackageDescriptor, dir: PathBuf) -> Result<Prepared> {
    ctx.ensure_active()?;
    tokio::fs::create_dir_all(&dir).await?;

    let archive_path = dir.join(descriptor.filename());
    let archive_size = download_to_file(
        &ctx,
        &descriptor.url,
        &archive_path,
        (&descriptor.name, &descriptor.version),
    )
    .await?;

    ctx.ensure_active()?;
    ctx.reporter.unpacking(&descriptor.name, &descriptor.version);
    let tree = dir.join("tree");
    let unpacked = tokio::task::spawn_blocking(move || {
        archive::unpack(&archive_path, &tree, &descriptor)
    })
    .await??;

    debug!(
        package = %unpacked.descriptor.id(),
        scripts = unpacked.scripts.len(),
        payload = unpacked.payload.len(),
        "unpacked"
    );

    Ok(Prepared {
        unpacked,
        scratch: dir,
        archive_size,
    })
}

async fn run_script(
    ctx: &Context,
    root: &RootFs,
    unpacked: &UnpackedPackage,
    kind: ScriptKind,
    ran: &mut Vec<ScriptKind>,
) -> Result<()> {
    let Some(script) = unpacked.script(kind) else {
        return Ok(());
    };
    let descriptor = &unpacked.descriptor;
    ctx.reporter.script(&descriptor.name, &descriptor.version, kind);
    ctx.runner.run(root.path(), script, &ctx.cancel).await?;
    ran.push(kind);
    Ok(())
}

/// Apply one unpacked package to the root.
async fn apply(
    ctx: &Context,
    root: &RootFs,
    prepared: Prepared,
    options: &MaterializeOptions,
) -> Result<PackageReport> {
    ctx.ensure_active()?;
    let Prepared {
        unpacked,
        scratch,
        archive_size,
    } = prepared;
    let descriptor = &unpacked.descriptor;
    ctx.reporter.installing(&descriptor.name, &descriptor.version);

    let mut scripts_run = Vec::new();
    run_script(ctx, root, &unpacked, ScriptKind::PreInstall, &mut scripts_run).await?;

    let debug_copy = match &options.debug_dir {
        Some(dir) => {
            let dest = dir.join(descriptor.id());
            let tree = unpacked.tree.clone();
            let target = dest.clone();
            tokio::task::spawn_blocking(move || rootfs::copy_tree(&tree, &target)).await??;
            Some(dest)
        }
        None => None,
    };

    let merged = {
        let root = root.clone();
        let tree = unpacked.tree.clone();
        tokio::task::spawn_blocking(move || root.merge(&tree)).await??
    };

    run_script(ctx, root, &unpacked, ScriptKind::PostInstall, &mut scripts_run).await?;
    if options.trigger_policy == TriggerPolicy::Run {
        run_script(ctx, root, &unpacked, ScriptKind::Trigger, &mut scripts_run).await?;
    }

    if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
        debug!(path = %scratch.display(), error = %e, "failed to clean scratch directory");
    }

    ctx.reporter.done(
        &descriptor.name,
        &descriptor.version,
        &format!("{} files", merged.files.len()),
        Some(archive_size),
    );

    Ok(PackageReport {
        scripts: unpacked.scripts.iter().map(|s| s.kind).collect(),
        scripts_run,
        merged,
        metadata: unpacked.metadata.clone(),
        debug_copy,
        archive_size,
        descriptor: unpacked.descriptor,
    })
}
