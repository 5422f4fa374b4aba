//! The distribution releases manifest (`releases.json`).
//!
//! Only the parts needed to locate signing keys are modelled; unknown
//! fields are ignored.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Top-level releases manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Releases {
    /// Every release line the distribution publishes.
    #[serde(default)]
    pub release_branches: Vec<ReleaseBranch>,
}

impl Releases {
    /// Find the branch whose `rel_branch` equals `version` (e.g. `v3.18`).
    pub fn branch(&self, version: &str) -> Option<&ReleaseBranch> {
        self.release_branches
            .iter()
            .find(|b| b.rel_branch == version)
    }
}

/// One release line and its signing keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseBranch {
    /// Branch identifier (`v3.18`, `edge`).
    pub rel_branch: String,
    /// Signing keys keyed by architecture.
    #[serde(default)]
    pub keys: HashMap<String, Vec<RepositoryKey>>,
}

impl ReleaseBranch {
    /// Key URLs valid for `arch` on `today`.
    ///
    /// A key whose `deprecated_since` date is on or before `today` is
    /// excluded. Keys with an unparseable date are kept.
    pub fn keys_for(&self, arch: &str, today: NaiveDate) -> Vec<&str> {
        self.keys
            .get(arch)
            .map(|keys| {
                keys.iter()
                    .filter(|k| k.is_valid_on(today))
                    .map(|k| k.url.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A signing key reference with its validity window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryKey {
    /// Where the PEM public key can be downloaded.
    pub url: String,
    /// Date (or timestamp) after which the key must no longer be trusted.
    #[serde(default)]
    pub deprecated_since: Option<String>,
}

impl RepositoryKey {
    /// Parsed deprecation date, if any.
    pub fn deprecated_on(&self) -> Option<NaiveDate> {
        let raw = self.deprecated_since.as_deref()?;
        let date = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }

    /// Returns `true` if the key may be used on `today`.
    pub fn is_valid_on(&self, today: NaiveDate) -> bool {
        self.deprecated_on().is_none_or(|d| d > today)
    }

    /// File name of the key (last URL path segment).
    pub fn filename(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }
}
