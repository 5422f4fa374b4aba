//! `APKINDEX` text format.
//!
//! An index is a sequence of records separated by blank lines. Each line
//! in a record is a single-letter key, a colon and a value:
//!
//! ```text
//! C:Q1ZXKJ8jhZ1ZPXFDZLFGkDJ7uK5yU=
//! P:curl
//! V:8.1.2-r0
//! A:x86_64
//! S:172394
//! I:299008
//! T:URL retrival utility and library
//! D:ca-certificates-bundle so:libc.musl-x86_64.so.1 so:libcurl.so.4
//! p:cmd:curl=8.1.2-r0
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::depend::{Dependency, Provide};
use crate::types::{PackageName, Version};

/// Errors raised while parsing an `APKINDEX` document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// A non-empty line did not have the `K:value` shape.
    #[error("malformed line {line}: '{content}'")]
    MalformedLine {
        /// 1-based line number.
        line: usize,
        /// Raw line content.
        content: String,
    },

    /// A record ended without one of its mandatory fields.
    #[error("record ending at line {line} is missing field '{field}'")]
    MissingField {
        /// 1-based line number of the record's last line.
        line: usize,
        /// The missing key (`P` or `V`).
        field: char,
    },
}

/// Metadata for one installable package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package name (`P:`).
    pub name: PackageName,
    /// Package version (`V:`).
    pub version: Version,
    /// Package architecture (`A:`), may be `noarch`.
    pub arch: String,
    /// Download URL, derived from the repository the index was fetched from.
    pub url: String,
    /// Control-segment checksum (`C:`), `Q1` + base64 SHA-1.
    #[serde(default)]
    pub checksum: Option<String>,
    /// Archive size in bytes (`S:`).
    #[serde(default)]
    pub size: u64,
    /// Installed size in bytes (`I:`).
    #[serde(default)]
    pub installed_size: u64,
    /// One-line description (`T:`).
    #[serde(default)]
    pub description: String,
    /// Upstream project URL (`U:`).
    #[serde(default)]
    pub homepage: String,
    /// License expression (`L:`).
    #[serde(default)]
    pub license: String,
    /// Origin (source) package (`o:`).
    #[serde(default)]
    pub origin: Option<String>,
    /// Maintainer (`m:`).
    #[serde(default)]
    pub maintainer: Option<String>,
    /// Build timestamp (`t:`), seconds since the epoch.
    #[serde(default)]
    pub build_time: Option<i64>,
    /// Source commit (`c:`).
    #[serde(default)]
    pub commit: Option<String>,
    /// Priority used when several packages provide the same capability (`k:`).
    #[serde(default)]
    pub provider_priority: Option<u32>,
    /// Declared dependencies (`D:`), including `!name` conflicts.
    #[serde(default)]
    pub depends: Vec<Dependency>,
    /// Provided capabilities (`p:`).
    #[serde(default)]
    pub provides: Vec<Provide>,
    /// Auto-install condition (`i:`).
    #[serde(default)]
    pub install_if: Vec<Dependency>,
}

impl PackageDescriptor {
    /// File name of the package archive (`{name}-{version}.apk`).
    pub fn filename(&self) -> String {
        format!("{}-{}.apk", self.name, self.version)
    }

    /// `name-version` identifier used in logs and reports.
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Dependencies that must be installed (conflict markers excluded).
    pub fn requires(&self) -> impl Iterator<Item = &Dependency> {
        self.depends.iter().filter(|d| !d.conflict)
    }

    /// `!name` conflict markers.
    pub fn conflicts(&self) -> impl Iterator<Item = &Dependency> {
        self.depends.iter().filter(|d| d.conflict)
    }
}

/// Parsed index of one repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageIndex {
    /// Repository URI the index was fetched from (without the arch suffix).
    pub repository: String,
    /// Architecture directory the index describes.
    pub arch: String,
    /// Optional `DESCRIPTION` from the index archive.
    #[serde(default)]
    pub description: Option<String>,
    /// Package descriptors in index order.
    pub packages: Vec<PackageDescriptor>,
}

impl PackageIndex {
    /// Parse `APKINDEX` text for the repository at `repository`/`arch`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] on malformed lines or records without `P:`/`V:`.
    pub fn parse(text: &str, repository: &str, arch: &str) -> Result<Self, IndexError> {
        let repository = repository.trim_end_matches('/');
        let mut packages = Vec::new();
        let mut record = RecordBuilder::default();

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim_end_matches('\r');
            if line.is_empty() {
                if let Some(desc) = record.finish(repository, arch)? {
                    packages.push(desc);
                }
                continue;
            }

            let Some((key, value)) = split_field(line) else {
                return Err(IndexError::MalformedLine {
                    line: line_no,
                    content: line.to_string(),
                });
            };
            record.set(key, value);
            record.last_line = line_no;
        }

        if let Some(desc) = record.finish(repository, arch)? {
            packages.push(desc);
        }

        Ok(Self {
            repository: repository.to_string(),
            arch: arch.to_string(),
            description: None,
            packages,
        })
    }

    /// Find every descriptor with the given name, in index order.
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PackageDescriptor> {
        self.packages.iter().filter(move |p| p.name == name)
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Returns `true` if the index holds no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[derive(Default)]
struct RecordBuilder {
    fields: Vec<(char, String)>,
    last_line: usize,
}

impl RecordBuilder {
    fn set(&mut self, key: char, value: &str) {
        self.fields.push((key, value.to_string()));
    }

    fn get(&self, key: char) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    fn finish(
        &mut self,
        repository: &str,
        arch: &str,
    ) -> Result<Option<PackageDescriptor>, IndexError> {
        if self.fields.is_empty() {
            return Ok(None);
        }
        let line = self.last_line;

        let name = self
            .get('P')
            .ok_or(IndexError::MissingField { line, field: 'P' })?;
        let version = self
            .get('V')
            .ok_or(IndexError::MissingField { line, field: 'V' })?;
        let name = PackageName::new(name);
        let version = Version::new(version);
        let url = format!("{repository}/{arch}/{name}-{version}.apk");

        let list = |key| {
            self.get(key)
                .map(|v| v.split_whitespace().collect::<Vec<_>>())
                .unwrap_or_default()
        };
        let owned = |key| self.get(key).map(str::to_string);

        let desc = PackageDescriptor {
            arch: self.get('A').unwrap_or("noarch").to_string(),
            url,
            checksum: owned('C'),
            size: self.get('S').and_then(|v| v.parse().ok()).unwrap_or(0),
            installed_size: self.get('I').and_then(|v| v.parse().ok()).unwrap_or(0),
            description: owned('T').unwrap_or_default(),
            homepage: owned('U').unwrap_or_default(),
            license: owned('L').unwrap_or_default(),
            origin: owned('o'),
            maintainer: owned('m'),
            build_time: self.get('t').and_then(|v| v.parse().ok()),
            commit: owned('c'),
            provider_priority: self.get('k').and_then(|v| v.parse().ok()),
            depends: list('D').into_iter().map(Dependency::parse).collect(),
            provides: list('p').into_iter().map(Provide::parse).collect(),
            install_if: list('i').into_iter().map(Dependency::parse).collect(),
            name,
            version,
        };

        self.fields.clear();
        Ok(Some(desc))
    }
}

/// Split `K:value`, where `K` is a single ASCII character.
fn split_field(line: &str) -> Option<(char, &str)> {
    let (key, value) = line.split_once(':')?;
    match key.as_bytes() {
        [b] if b.is_ascii() => Some((char::from(*b), value)),
        _ => None,
    }
}
