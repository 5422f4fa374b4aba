//! Options file loading and command-line overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use apkroot_core::{BuildOptions, ConflictPolicy, TriggerPolicy};

use crate::BuildArgs;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "apkroot.toml";

/// Load the options file (explicit path or `./apkroot.toml`), then apply
/// the command-line overrides.
pub fn load(config: Option<&Path>, args: &BuildArgs) -> Result<BuildOptions> {
    let path = match config {
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.is_file()),
    };

    let mut options = match path {
        Some(path) => BuildOptions::load(&path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => BuildOptions::default(),
    };
    apply(&mut options, args);
    Ok(options)
}

/// Overlay every flag that was given on `options`.
pub fn apply(options: &mut BuildOptions, args: &BuildArgs) {
    if let Some(distribution) = args.distribution {
        options.distribution = distribution;
    }
    if let Some(arch) = args.arch {
        options.arch = Some(arch);
    }
    if let Some(release) = &args.release {
        options.version = Some(release.clone());
    }
    if let Some(repository) = &args.repository {
        options.repository = Some(repository.clone());
    }
    options
        .extra_repositories
        .extend(args.extra_repositories.iter().cloned());
    if args.no_base {
        options.skip_base_packages = true;
    }
    if !args.base_packages.is_empty() {
        options.base_packages = Some(args.base_packages.clone());
    }
    if args.abort_on_conflict {
        options.conflict_policy = ConflictPolicy::Abort;
    }
    if args.run_triggers {
        options.trigger_policy = TriggerPolicy::Run;
    }
    if let Some(jobs) = args.jobs {
        options.concurrency = jobs;
    }
    if args.no_apk_db {
        options.write_apk_db = false;
    }
    if let Some(base) = &args.base_dir {
        options.base = Some(base.clone());
    }
}
