//! Root Filesystem Assembler.
//!
//! The root is a plain directory. Package payloads are merged into it one
//! after another: regular files and symlinks replace whatever is at the
//! destination, directories are created or kept. Top-level dotfiles and
//! any name on the exclude list are never merged.
//!
//! Destination paths are resolved inside the root, so a symlink such as
//! `bin -> /usr/bin` shipped by a package is followed relative to the root
//! and never escapes it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;

/// Symlink hops followed before giving up.
const MAX_LINK_DEPTH: usize = 40;

/// What one merge changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeStats {
    /// Paths (relative to the root) of the files and symlinks written.
    pub files: Vec<PathBuf>,
    /// Directories created or kept.
    pub directories: Vec<PathBuf>,
    /// Entries skipped because they could not replace what was there.
    pub skipped: Vec<PathBuf>,
}

/// The accumulating root filesystem.
#[derive(Debug, Clone)]
pub struct RootFs {
    root: PathBuf,
    excludes: Vec<String>,
}

impl RootFs {
    /// Open (creating if needed) a root at `root`.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            excludes: Vec::new(),
        })
    }

    /// Also exclude these top-level names from every merge.
    #[must_use]
    pub fn with_excludes(mut self, excludes: impl IntoIterator<Item = String>) -> Self {
        self.excludes.extend(excludes);
        self
    }

    /// Path of the root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if a top-level entry named `name` is never merged.
    pub fn is_excluded(&self, name: &str) -> bool {
        name.starts_with('.') || self.excludes.iter().any(|e| e == name)
    }

    /// Merge the tree at `src` into the root, last write wins.
    ///
    /// # Errors
    ///
    /// Any filesystem failure other than an entry that cannot replace an
    /// existing directory (those are skipped and logged).
    pub fn merge(&self, src: &Path) -> Result<MergeStats> {
        self.merge_tree(src, true)
    }

    /// Copy an existing directory tree into the root as its starting point.
    ///
    /// Unlike [`RootFs::merge`], top-level dotfiles of `base` are kept.
    ///
    /// # Errors
    ///
    /// See [`RootFs::merge`].
    pub fn seed(&self, base: &Path) -> Result<MergeStats> {
        self.merge_tree(base, false)
    }

    fn merge_tree(&self, src: &Path, apply_excludes: bool) -> Result<MergeStats> {
        let mut stats = MergeStats::default();

        let walker = WalkDir::new(src)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !apply_excludes
                    || e.depth() != 1
                    || !self.is_excluded(&e.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            let rel = entry
                .path()
                .strip_prefix(src)
                .map_err(io::Error::other)?
                .to_path_buf();
            let file_type = entry.file_type();

            let Some(dest) = self.resolve(&rel)? else {
                warn!(path = %rel.display(), "symlink chain too deep, skipping");
                stats.skipped.push(rel);
                continue;
            };

            if file_type.is_dir() {
                merge_dir(entry.path(), &dest)?;
                stats.directories.push(rel);
            } else if file_type.is_symlink() || file_type.is_file() {
                if dest.symlink_metadata().is_ok_and(|m| m.is_dir()) {
                    warn!(path = %rel.display(), "not replacing a directory with a file");
                    stats.skipped.push(rel);
                    continue;
                }
                if dest.symlink_metadata().is_ok() {
                    fs::remove_file(&dest)?;
                }
                if file_type.is_symlink() {
                    copy_symlink(entry.path(), &dest)?;
                } else {
                    fs::copy(entry.path(), &dest)?;
                }
                stats.files.push(rel);
            } else {
                debug!(path = %rel.display(), "skipping special file");
                stats.skipped.push(rel);
            }
        }

        Ok(stats)
    }

    /// Resolve `rel` to an absolute path inside the root.
    ///
    /// Every parent component that is a symlink is followed with the root
    /// as `/`. The final component is not followed. Returns `None` if the
    /// link chain is too deep.
    fn resolve(&self, rel: &Path) -> io::Result<Option<PathBuf>> {
        let Some(file_name) = rel.file_name() else {
            return Ok(None);
        };
        let parent = rel.parent().unwrap_or_else(|| Path::new(""));

        let mut resolved = PathBuf::new();
        let mut pending: Vec<PathBuf> = components_rev(parent);
        let mut hops = 0;

        while let Some(component) = pending.pop() {
            match component.to_str() {
                Some("..") => {
                    resolved.pop();
                    continue;
                }
                Some("." | "") => continue,
                _ => {}
            }

            let candidate = resolved.join(&component);
            let full = self.root.join(&candidate);
            match fs::symlink_metadata(&full) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    hops += 1;
                    if hops > MAX_LINK_DEPTH {
                        return Ok(None);
                    }
                    let target = fs::read_link(&full)?;
                    if target.is_absolute() {
                        resolved = PathBuf::new();
                    }
                    pending.extend(components_rev(&target));
                }
                _ => resolved = candidate,
            }
        }

        Ok(Some(self.root.join(resolved).join(file_name)))
    }
}

fn components_rev(path: &Path) -> Vec<PathBuf> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(PathBuf::from(s)),
            Component::ParentDir => Some(PathBuf::from("..")),
            _ => None,
        })
        .rev()
        .collect()
}

fn merge_dir(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::metadata(dest) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => {
            fs::remove_file(dest)?;
            create_dir_like(src, dest)
        }
        Err(_) => {
            if dest.symlink_metadata().is_ok() {
                // Dangling symlink.
                fs::remove_file(dest)?;
            }
            create_dir_like(src, dest)
        }
    }
}

fn create_dir_like(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir(dest)?;
    let permissions = fs::metadata(src)?.permissions();
    fs::set_permissions(dest, permissions)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(src, dest).map(|_| ())
}

/// Recursively copy `src` to `dest`, preserving symlinks.
///
/// # Errors
///
/// Any filesystem failure.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        copy_entry(entry.path(), &dest.join(rel))?;
    }
    Ok(())
}

fn copy_entry(src: &Path, dest: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        copy_symlink(src, dest)
    } else if meta.is_dir() {
        fs::create_dir_all(dest)?;
        fs::set_permissions(dest, meta.permissions())
    } else if meta.is_file() {
        fs::copy(src, dest).map(|_| ())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let root = RootFs::create(dir.path().join("root")).unwrap();

        let first = dir.path().join("first");
        write(&first.join("etc/motd"), "first");
        write(&first.join("etc/issue"), "kept");
        let second = dir.path().join("second");
        write(&second.join("etc/motd"), "second");

        root.merge(&first).unwrap();
        let stats = root.merge(&second).unwrap();

        assert_eq!(stats.files, vec![PathBuf::from("etc/motd")]);
        assert_eq!(
            fs::read_to_string(root.path().join("etc/motd")).unwrap(),
            "second"
        );
        assert_eq!(
            fs::read_to_string(root.path().join("etc/issue")).unwrap(),
            "kept"
        );
    }

    #[test]
    fn test_dotfiles_and_excludes_are_never_merged() {
        let dir = tempfile::tempdir().unwrap();
        let root = RootFs::create(dir.path().join("root"))
            .unwrap()
            .with_excludes(["dev".to_string()]);

        let pkg = dir.path().join("pkg");
        write(&pkg.join(".post-install"), "#!/bin/sh");
        write(&pkg.join(".PKGINFO"), "pkgname = x");
        write(&pkg.join("dev/null"), "");
        write(&pkg.join("usr/share/doc/.keep"), "");

        root.merge(&pkg).unwrap();

        assert!(!root.path().join(".post-install").exists());
        assert!(!root.path().join(".PKGINFO").exists());
        assert!(!root.path().join("dev").exists());
        // Only top-level dotfiles are metadata.
        assert!(root.path().join("usr/share/doc/.keep").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_symlinks_resolve_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = RootFs::create(dir.path().join("root")).unwrap();

        let layout = dir.path().join("layout");
        fs::create_dir_all(layout.join("usr/bin")).unwrap();
        std::os::unix::fs::symlink("/usr/bin", layout.join("bin")).unwrap();
        root.merge(&layout).unwrap();

        let pkg = dir.path().join("pkg");
        write(&pkg.join("bin/hello"), "hello");
        root.merge(&pkg).unwrap();

        assert!(root.path().join("bin").symlink_metadata().unwrap().is_symlink());
        assert_eq!(
            fs::read_to_string(root.path().join("usr/bin/hello")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_file_does_not_replace_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = RootFs::create(dir.path().join("root")).unwrap();

        let first = dir.path().join("first");
        write(&first.join("opt/app/file"), "x");
        let second = dir.path().join("second");
        write(&second.join("opt/app"), "not a dir");

        root.merge(&first).unwrap();
        let stats = root.merge(&second).unwrap();

        assert_eq!(stats.skipped, vec![PathBuf::from("opt/app")]);
        assert!(root.path().join("opt/app/file").is_file());
    }

    #[test]
    fn test_seed_keeps_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        let root = RootFs::create(dir.path().join("root")).unwrap();
        let base = dir.path().join("base");
        write(&base.join(".profile"), "export PS1");
        write(&base.join("etc/hostname"), "box");

        root.seed(&base).unwrap();

        assert!(root.path().join(".profile").is_file());
        assert!(root.path().join("etc/hostname").is_file());
    }

    #[test]
    fn test_copy_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write(&src.join(".trigger"), "#!/bin/sh");
        write(&src.join("usr/lib/libz.so.1"), "elf");

        let dest = dir.path().join("copy");
        copy_tree(&src, &dest).unwrap();

        assert!(dest.join(".trigger").is_file());
        assert!(dest.join("usr/lib/libz.so.1").is_file());
    }
}
