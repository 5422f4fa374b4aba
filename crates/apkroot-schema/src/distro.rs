//! Distribution presets and repository references.

use serde::{Deserialize, Serialize};

/// Supported distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// Alpine Linux.
    #[default]
    Alpine,
    /// Wolfi (Chainguard).
    Wolfi,
}

/// Where the trusted signing keys of a distribution come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KeySource {
    /// Look up the branch in a releases manifest and use its keys.
    Releases {
        /// URL of `releases.json`.
        url: String,
        /// Branch to select (`v3.18`).
        version: String,
    },
    /// A single well-known key.
    Fixed {
        /// URL of the PEM public key.
        url: String,
    },
}

impl Distribution {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alpine => "alpine",
            Self::Wolfi => "wolfi",
        }
    }

    /// Default repository of the distribution.
    pub fn repository(&self) -> RepositoryRef {
        match self {
            Self::Alpine => RepositoryRef::new("https://dl-cdn.alpinelinux.org/alpine")
                .with_version("v3.18")
                .with_component("main"),
            Self::Wolfi => RepositoryRef::new("https://packages.wolfi.dev/os"),
        }
    }

    /// Source of the signing keys for the default repository.
    pub fn key_source(&self) -> KeySource {
        match self {
            Self::Alpine => KeySource::Releases {
                url: "https://alpinelinux.org/releases.json".to_string(),
                version: "v3.18".to_string(),
            },
            Self::Wolfi => KeySource::Fixed {
                url: "https://packages.wolfi.dev/os/wolfi-signing.rsa.pub".to_string(),
            },
        }
    }

    /// Packages installed ahead of every request.
    pub fn base_packages(&self) -> &'static [&'static str] {
        match self {
            Self::Alpine => &["alpine-baselayout", "busybox"],
            Self::Wolfi => &["wolfi-baselayout", "busybox"],
        }
    }
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Distribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alpine" => Ok(Self::Alpine),
            "wolfi" => Ok(Self::Wolfi),
            _ => Err(format!("Unknown distribution: {s}")),
        }
    }
}

/// A repository location built from its components.
///
/// ```
/// use apkroot_schema::RepositoryRef;
///
/// let repo = RepositoryRef::new("https://dl-cdn.alpinelinux.org/alpine")
///     .with_version("v3.18")
///     .with_component("main");
/// assert_eq!(repo.uri(), "https://dl-cdn.alpinelinux.org/alpine/v3.18/main");
/// assert_eq!(
///     repo.index_url("x86_64"),
///     "https://dl-cdn.alpinelinux.org/alpine/v3.18/main/x86_64/APKINDEX.tar.gz"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Base URI (`https://dl-cdn.alpinelinux.org/alpine`).
    pub base: String,
    /// Distribution version segment, empty when unused.
    #[serde(default)]
    pub version: String,
    /// Component segment (`main`, `community`), empty when unused.
    #[serde(default)]
    pub component: String,
    /// Architecture segment. Empty leaves it to the index fetcher.
    #[serde(default)]
    pub arch: String,
}

impl RepositoryRef {
    /// Reference a bare repository URI.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    /// Set the version segment.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the component segment.
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    /// Set the architecture segment.
    #[must_use]
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Repository URI with every non-empty segment joined by `/`.
    pub fn uri(&self) -> String {
        let mut uri = self.base.trim_end_matches('/').to_string();
        for segment in [&self.version, &self.component, &self.arch] {
            let segment = segment.trim_matches('/');
            if !segment.is_empty() {
                uri.push('/');
                uri.push_str(segment);
            }
        }
        uri
    }

    /// `APKINDEX.tar.gz` URL for `arch`.
    pub fn index_url(&self, arch: &str) -> String {
        index_url(&self.uri(), arch)
    }
}

/// `APKINDEX.tar.gz` URL of an architecture-independent repository URI.
pub fn index_url(repository: &str, arch: &str) -> String {
    format!("{}/{arch}/APKINDEX.tar.gz", repository.trim_end_matches('/'))
}
