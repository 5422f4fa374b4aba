//! Lifecycle script execution.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use apkroot_schema::{PackageName, Version};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::archive::ScriptKind;
use crate::error::{Error, Result};

/// Location of the staged script inside the root.
pub const STAGED_SCRIPT: &str = "/tmp/.apkroot-script";

/// PATH handed to scripts.
const SCRIPT_PATH_ENV: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// A lifecycle script extracted from a package.
#[derive(Debug, Clone)]
pub struct Script {
    /// Owning package.
    pub package: PackageName,
    /// Version being installed, passed as the first argument.
    pub version: Version,
    /// Install phase.
    pub kind: ScriptKind,
    /// Path of the extracted script in scratch space.
    pub path: PathBuf,
}

impl Script {
    /// `name-version` of the owning package.
    pub fn package_id(&self) -> String {
        format!("{}-{}", self.package, self.version)
    }
}

/// Executes lifecycle scripts against the accumulating root.
#[async_trait]
pub trait ScriptRunner: Send + Sync + std::fmt::Debug {
    /// Run `script` with `root` as its filesystem root.
    ///
    /// # Errors
    ///
    /// [`Error::ScriptExecution`] on a non-zero exit, [`Error::Cancelled`]
    /// when `cancel` fires first.
    async fn run(&self, root: &Path, script: &Script, cancel: &CancellationToken) -> Result<()>;
}

/// Runs scripts with `chroot(8)`.
///
/// The script is copied to [`STAGED_SCRIPT`] inside the root, executed with
/// a cleared environment and removed again.
///
/// `chroot` needs `CAP_SYS_CHROOT`, so builds that run scripts this way
/// must run as root (or in a user namespace that grants it). The script's
/// `#!` interpreter must already exist in the root: packages installed
/// first, such as `alpine-baselayout`, ship a `.pre-install` that runs
/// before any shell has been unpacked. Seed the root with a directory that
/// provides `/bin/sh` (`BuildOptions::base`, `--base-dir` on the command
/// line) or supply another [`ScriptRunner`].
#[derive(Debug, Clone, Default)]
pub struct ChrootRunner {
    chroot: Option<PathBuf>,
}

impl ChrootRunner {
    /// Use a specific `chroot` binary instead of looking it up on `PATH`.
    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            chroot: Some(path.into()),
        }
    }

    fn binary(&self) -> Result<PathBuf> {
        match &self.chroot {
            Some(path) => Ok(path.clone()),
            None => which::which("chroot")
                .map_err(|e| Error::Config(format!("chroot not available: {e}"))),
        }
    }
}

#[async_trait]
impl ScriptRunner for ChrootRunner {
    async fn run(&self, root: &Path, script: &Script, cancel: &CancellationToken) -> Result<()> {
        let chroot = self.binary()?;
        let body = tokio::fs::read(&script.path).await?;
        if let Some(interpreter) = interpreter(&body) {
            let inside = root.join(interpreter.trim_start_matches('/'));
            if tokio::fs::symlink_metadata(&inside).await.is_err() {
                return Err(Error::Config(format!(
                    "{} script of {} needs {interpreter}, which is not in the root yet; \
                     seed the root with a base directory that provides it",
                    script.kind,
                    script.package_id()
                )));
            }
        }

        let staged = root.join(STAGED_SCRIPT.trim_start_matches('/'));
        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&staged, &body).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&staged, std::fs::Permissions::from_mode(0o755)).await?;
        }

        debug!(package = %script.package, kind = %script.kind, "running script");

        let mut cmd = tokio::process::Command::new(chroot);
        cmd.arg(root)
            .arg(STAGED_SCRIPT)
            .arg(script.version.as_str())
            .env_clear()
            .env("PATH", SCRIPT_PATH_ENV)
            .env("HOME", "/root")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let outcome = tokio::select! {
            status = cmd.status() => status.map_err(Error::from),
            () = cancel.cancelled() => Err(Error::Cancelled),
        };
        tokio::fs::remove_file(&staged).await.ok();

        let status = outcome?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::ScriptExecution {
                package: script.package_id(),
                kind: script.kind,
                code: status.code(),
            })
        }
    }
}

/// The `#!` interpreter named on the first line of a script.
fn interpreter(body: &[u8]) -> Option<&str> {
    let line = body.strip_prefix(b"#!")?.split(|b| *b == b'\n').next()?;
    std::str::from_utf8(line).ok()?.split_whitespace().next()
}
