//! Build options.
//!
//! Options can be loaded from a TOML file (`apkroot.toml`) and are then
//! overridden field by field from the command line.

use std::fs;
use std::path::{Path, PathBuf};

use apkroot_schema::{Arch, Distribution, KeySource};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What to do when the resolved set contains conflicting packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Log the conflicts and install every resolved package.
    #[default]
    Proceed,
    /// Fail before any package is fetched.
    Abort,
}

/// Whether `.trigger` scripts are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerPolicy {
    /// Extract triggers but never run them.
    #[default]
    Skip,
    /// Run each trigger after the package's post-install script.
    Run,
}

/// Everything that shapes a build besides the requested package names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildOptions {
    /// Distribution preset providing repository, keys and base packages.
    pub distribution: Distribution,
    /// Target architecture. `None` selects the host architecture.
    pub arch: Option<Arch>,
    /// Release branch overriding the distribution default (`v3.19`).
    pub version: Option<String>,
    /// Primary repository overriding the distribution default.
    pub repository: Option<String>,
    /// Repositories consulted after the primary one, in order.
    pub extra_repositories: Vec<String>,
    /// Signing key source overriding the distribution default.
    pub keys: Option<KeySource>,
    /// Base packages overriding the distribution default.
    pub base_packages: Option<Vec<String>>,
    /// Do not prepend any base packages.
    pub skip_base_packages: bool,
    /// Conflict handling.
    pub conflict_policy: ConflictPolicy,
    /// Trigger handling.
    pub trigger_policy: TriggerPolicy,
    /// Copy every package's unpacked tree aside for inspection.
    pub keep_debug_copies: bool,
    /// Where debug copies go. Defaults to `$APKROOT_HOME/debug`.
    pub debug_dir: Option<PathBuf>,
    /// Maximum number of packages fetched and unpacked at once.
    pub concurrency: usize,
    /// Write `lib/apk/db/installed` and `etc/apk/*` into the root.
    pub write_apk_db: bool,
    /// Directory copied into the root before any package.
    pub base: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            distribution: Distribution::default(),
            arch: None,
            version: None,
            repository: None,
            extra_repositories: Vec::new(),
            keys: None,
            base_packages: None,
            skip_base_packages: false,
            conflict_policy: ConflictPolicy::default(),
            trigger_policy: TriggerPolicy::default(),
            keep_debug_copies: false,
            debug_dir: None,
            concurrency: num_cpus::get(),
            write_apk_db: true,
            base: None,
        }
    }
}

impl BuildOptions {
    /// Options for `distribution` with every other field defaulted.
    pub fn for_distribution(distribution: Distribution) -> Self {
        Self {
            distribution,
            ..Self::default()
        }
    }

    /// Load options from a TOML file.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be read, [`Error::Config`] if it
    /// does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parse options from TOML text.
    ///
    /// # Errors
    ///
    /// The TOML parse error.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The effective target architecture.
    pub fn target_arch(&self) -> Arch {
        self.arch.unwrap_or_else(Arch::current)
    }

    /// Repositories in fetch order: the primary one first.
    pub fn repositories(&self) -> Vec<String> {
        let primary = match &self.repository {
            Some(repo) => repo.trim_end_matches('/').to_string(),
            None => {
                let mut repo = self.distribution.repository();
                if let Some(version) = &self.version {
                    repo = repo.with_version(version.clone());
                }
                repo.uri()
            }
        };
        std::iter::once(primary)
            .chain(
                self.extra_repositories
                    .iter()
                    .map(|r| r.trim_end_matches('/').to_string()),
            )
            .collect()
    }

    /// The effective key source.
    pub fn key_source(&self) -> KeySource {
        if let Some(keys) = &self.keys {
            return keys.clone();
        }
        match (self.distribution.key_source(), &self.version) {
            (KeySource::Releases { url, .. }, Some(version)) => KeySource::Releases {
                url,
                version: version.clone(),
            },
            (source, _) => source,
        }
    }

    /// Base packages to prepend to a request.
    pub fn effective_base_packages(&self) -> Vec<String> {
        if self.skip_base_packages {
            return Vec::new();
        }
        match &self.base_packages {
            Some(packages) => packages.clone(),
            None => self
                .distribution
                .base_packages()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Base packages followed by `requested`, without repeats.
    pub fn request(&self, requested: &[String]) -> Vec<String> {
        let mut request = self.effective_base_packages();
        for name in requested {
            if !request.contains(name) {
                request.push(name.clone());
            }
        }
        request
    }

    /// Concurrency, never below one.
    pub fn jobs(&self) -> usize {
        self.concurrency.max(1)
    }
}
