//! apkroot - materialize Alpine and Wolfi packages into a root filesystem
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! # Overview
//!
//! `apkroot build curl -o rootfs` fetches the distribution's signing keys,
//! verifies the repository index, resolves `curl` plus the base packages
//! and installs everything into `rootfs/` without `apk` or a container
//! runtime.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.apkroot/
//! └── debug/      # per-package copies kept by `apkroot debug`
//! ```

pub mod cmd;
pub mod config;
pub mod ui;

use std::path::PathBuf;

use apkroot_schema::{Arch, Distribution};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "apkroot")]
#[command(
    author,
    version,
    about = "apkroot - materialize Alpine and Wolfi packages into a root filesystem"
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Options file (defaults to ./apkroot.toml when present)
    #[arg(long, global = true, env = "APKROOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a root filesystem from packages
    Build {
        /// Package names, optionally constrained: curl or curl>=8
        #[arg(required = true)]
        packages: Vec<String>,
        /// Directory to create (must not exist or be empty)
        #[arg(short, long)]
        output: PathBuf,
        /// Keep a copy of every unpacked package for inspection
        #[arg(long)]
        debug: bool,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Resolve packages and report what a build would install
    Scan {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Print a plain table instead of JSON
        #[arg(long)]
        legacy: bool,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Build with per-package copies and print what every package did
    Debug {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Directory to create (must not exist or be empty)
        #[arg(short, long)]
        output: PathBuf,
        /// Where per-package copies go (default: ~/.apkroot/debug)
        #[arg(long)]
        debug_dir: Option<PathBuf>,
        /// Open $SHELL inside the finished root
        #[arg(long)]
        shell: bool,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Flags shared by `build`, `scan` and `debug`. Each one overrides the
/// options file.
#[derive(Debug, Clone, Default, Args)]
pub struct BuildArgs {
    /// Distribution preset: alpine or wolfi
    #[arg(long, short = 'd')]
    pub distribution: Option<Distribution>,

    /// Target architecture (default: host)
    #[arg(long, env = "APKROOT_ARCH")]
    pub arch: Option<Arch>,

    /// Release branch, e.g. v3.19
    #[arg(long)]
    pub release: Option<String>,

    /// Primary repository URI
    #[arg(long, env = "APKROOT_REPOSITORY")]
    pub repository: Option<String>,

    /// Additional repository URI, consulted after the primary one
    #[arg(long = "extra-repository", value_name = "URI")]
    pub extra_repositories: Vec<String>,

    /// Do not install the distribution's base packages
    #[arg(long)]
    pub no_base: bool,

    /// Replace the distribution's base packages
    #[arg(long = "base-package", value_name = "NAME", conflicts_with = "no_base")]
    pub base_packages: Vec<String>,

    /// Fail when the resolved set contains conflicting packages
    #[arg(long)]
    pub abort_on_conflict: bool,

    /// Run .trigger scripts after post-install
    #[arg(long)]
    pub run_triggers: bool,

    /// Packages fetched in parallel
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Do not write the apk database into the root
    #[arg(long)]
    pub no_apk_db: bool,

    /// Directory copied into the root before any package
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,
}
