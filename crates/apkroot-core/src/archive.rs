//! Package archives (`.apk`).
//!
//! An `.apk` is two or three gzip members forming one tar stream: an
//! optional signature, the control segment (`.PKGINFO` and lifecycle
//! scripts) and the payload. Everything is unpacked into a scratch
//! directory and the top-level entries are then split into metadata
//! (dotfiles) and payload.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use apkroot_schema::PackageDescriptor;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::gzip;
use crate::scripts::Script;

/// Lifecycle phase of a package-supplied script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptKind {
    /// `.pre-install`: runs before the payload is merged.
    PreInstall,
    /// `.post-install`: runs after the payload is merged.
    PostInstall,
    /// `.trigger`: extracted, only run when triggers are enabled.
    Trigger,
    /// Any other top-level dotfile. Never executed or merged.
    Unknown,
}

impl ScriptKind {
    /// Classify a top-level archive entry.
    ///
    /// Returns `None` for payload entries, i.e. names not starting with `.`.
    pub fn classify(name: &str) -> Option<Self> {
        if !name.starts_with('.') {
            return None;
        }
        Some(match name {
            ".pre-install" => Self::PreInstall,
            ".post-install" => Self::PostInstall,
            ".trigger" => Self::Trigger,
            _ => Self::Unknown,
        })
    }

    /// Kebab-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreInstall => "pre-install",
            Self::PostInstall => "post-install",
            Self::Trigger => "trigger",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package extracted into its own scratch directory.
#[derive(Debug, Clone)]
pub struct UnpackedPackage {
    /// Descriptor the archive was fetched for.
    pub descriptor: PackageDescriptor,
    /// Extracted tree, dotfiles included.
    pub tree: PathBuf,
    /// Lifecycle scripts found at the top level.
    pub scripts: Vec<Script>,
    /// Top-level payload entry names, sorted.
    pub payload: Vec<String>,
    /// Top-level dotfile names, sorted.
    pub metadata: Vec<String>,
}

impl UnpackedPackage {
    /// The script for `kind`, if the package ships one.
    pub fn script(&self, kind: ScriptKind) -> Option<&Script> {
        self.scripts.iter().find(|s| s.kind == kind)
    }
}

/// Unpack the archive at `archive` into `tree` and classify its entries.
///
/// The control checksum is verified first when the descriptor carries one.
///
/// # Errors
///
/// [`Error::Archive`] for checksum mismatches and corrupt archives,
/// [`Error::Io`] for local filesystem failures.
pub fn unpack(
    archive: &Path,
    tree: &Path,
    descriptor: &PackageDescriptor,
) -> Result<UnpackedPackage> {
    let archive_error = |reason: String| Error::Archive {
        package: descriptor.id(),
        url: descriptor.url.clone(),
        reason,
    };

    let data = fs::read(archive)?;
    if let Some(expected) = &descriptor.checksum {
        let actual = control_checksum(&data).map_err(archive_error)?;
        if &actual != expected {
            return Err(archive_error(format!(
                "checksum mismatch: expected {expected}, got {actual}"
            )));
        }
    }

    fs::create_dir_all(tree)?;
    let mut tar = tar::Archive::new(MultiGzDecoder::new(data.as_slice()));
    tar.set_ignore_zeros(true);
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);
    tar.unpack(tree)
        .map_err(|e| archive_error(format!("extraction failed: {e}")))?;

    let mut names: Vec<String> = fs::read_dir(tree)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()?;
    names.sort();

    let mut scripts = Vec::new();
    let mut payload = Vec::new();
    let mut metadata = Vec::new();
    for name in names {
        match ScriptKind::classify(&name) {
            None => payload.push(name),
            Some(ScriptKind::Unknown) => {
                debug!(package = %descriptor.name, entry = %name, "dropping metadata entry");
                metadata.push(name);
            }
            Some(kind) => {
                scripts.push(Script {
                    package: descriptor.name.clone(),
                    version: descriptor.version.clone(),
                    kind,
                    path: tree.join(&name),
                });
                metadata.push(name);
            }
        }
    }

    Ok(UnpackedPackage {
        descriptor: descriptor.clone(),
        tree: tree.to_path_buf(),
        scripts,
        payload,
        metadata,
    })
}

/// `Q1` + base64(SHA-1) of the control gzip member, as used by `C:` lines.
///
/// # Errors
///
/// A description of the framing problem.
pub fn control_checksum(data: &[u8]) -> std::result::Result<String, String> {
    let members = gzip::members(data).map_err(|e| format!("invalid gzip framing: {e}"))?;
    let first = members.first().ok_or("empty archive")?;

    let (first_tar, _) = gzip::split_first(&data[first.clone()]).map_err(|e| e.to_string())?;
    let control = if is_signature_segment(&first_tar) {
        members
            .get(1)
            .ok_or("archive has a signature but no control segment")?
    } else {
        first
    };

    let digest = openssl::sha::sha1(&data[control.clone()]);
    Ok(format!("Q1{}", STANDARD.encode(digest)))
}

fn is_signature_segment(tar_data: &[u8]) -> bool {
    let mut archive = tar::Archive::new(tar_data);
    let Ok(mut entries) = archive.entries() else {
        return false;
    };
    let Some(Ok(entry)) = entries.next() else {
        return false;
    };
    entry
        .path()
        .is_ok_and(|p| p.to_string_lossy().starts_with(".SIGN."))
}
