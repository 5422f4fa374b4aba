//! State directory layout.

use dirs::home_dir;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Returns the state directory, or None if the user's home cannot be resolved.
pub fn try_apkroot_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("APKROOT_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".apkroot"))
}

/// Returns the apkroot state directory (`~/.apkroot`).
///
/// # Errors
///
/// Fails if neither `APKROOT_HOME` is set nor the home directory can be resolved.
pub fn apkroot_home() -> Result<PathBuf> {
    try_apkroot_home().ok_or_else(|| {
        Error::Config("could not determine home directory, set APKROOT_HOME".to_string())
    })
}

/// Default location of per-package debug copies: `~/.apkroot/debug`
///
/// # Errors
///
/// See [`apkroot_home`].
pub fn debug_path() -> Result<PathBuf> {
    Ok(apkroot_home()?.join("debug"))
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://alpinelinux.org/keys/alpine-devel@lists.alpinelinux.org-4a6a0840.rsa.pub"),
            "alpine-devel@lists.alpinelinux.org-4a6a0840.rsa.pub"
        );
        assert_eq!(filename_from_url(""), "");
    }
}
