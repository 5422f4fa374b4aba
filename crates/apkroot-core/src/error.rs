//! Error taxonomy shared by every stage of a build.

use std::fmt;

use thiserror::Error;

use crate::archive::ScriptKind;
use crate::resolver::Conflict;

/// Result alias used throughout `apkroot-core`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while materializing a root filesystem.
#[derive(Error, Debug)]
pub enum Error {
    /// A URL was unreachable or answered with a non-success status.
    #[error("network error fetching {url}: {reason}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport error or HTTP status.
        reason: String,
    },

    /// An index signature could not be verified against the trusted keys.
    #[error("signature verification failed for {url}: {reason}")]
    Signature {
        /// Index URL.
        url: String,
        /// What did not check out.
        reason: String,
    },

    /// A key, release branch or other named resource does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource.
        what: String,
    },

    /// A remote document could not be parsed.
    #[error("malformed document at {url}: {reason}")]
    Malformed {
        /// Where the document came from.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// No descriptor satisfies a dependency.
    #[error("unresolved dependency '{name}' (required by {required_by})")]
    UnresolvedDependency {
        /// The unsatisfied dependency atom.
        name: String,
        /// Package that declared it, or `request` for top-level names.
        required_by: String,
    },

    /// A package archive could not be unpacked or failed verification.
    #[error("invalid archive for {package} ({url}): {reason}")]
    Archive {
        /// `name-version` of the package.
        package: String,
        /// Archive URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// A lifecycle script exited unsuccessfully.
    #[error("{kind} script of {package} failed ({})", exit_status(.code.as_ref()))]
    ScriptExecution {
        /// `name-version` of the package.
        package: String,
        /// Which script failed.
        kind: ScriptKind,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },

    /// A failure while materializing one package.
    #[error("failed to install {package} from {url}: {source}")]
    Package {
        /// `name-version` of the package.
        package: String,
        /// Archive URL.
        url: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The resolved set contains conflicts and the policy is to abort.
    #[error("{} conflict(s) in resolved package set: {}", .0.len(), list_conflicts(.0))]
    Conflicts(Vec<Conflict>),

    /// Invalid options or configuration file.
    #[error("configuration error: {0}")]
    Config(String),

    /// The build was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A report could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    /// Wrap `self` with the package and URL it happened for.
    ///
    /// Cancellation is passed through unchanged so callers can match on it.
    pub fn for_package(self, package: &str, url: &str) -> Self {
        match self {
            Self::Cancelled | Self::Package { .. } => self,
            other => Self::Package {
                package: package.to_string(),
                url: url.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through [`Error::Package`] wrappers.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Package { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn network(url: &str, reason: impl fmt::Display) -> Self {
        Self::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn exit_status(code: Option<&i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "killed by signal".to_string(),
    }
}

fn list_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::other(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_wrapper_names_package_and_url() {
        let err = Error::network("https://r/x86_64/curl-8.1.2-r0.apk", "HTTP 500")
            .for_package("curl-8.1.2-r0", "https://r/x86_64/curl-8.1.2-r0.apk");
        let msg = err.to_string();
        assert!(msg.contains("curl-8.1.2-r0"));
        assert!(msg.contains("https://r/x86_64/curl-8.1.2-r0.apk"));
        assert!(matches!(err.root_cause(), Error::Network { .. }));
    }

    #[test]
    fn test_cancelled_is_not_wrapped() {
        let err = Error::Cancelled.for_package("curl-8.1.2-r0", "https://r");
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_script_error_message() {
        let err = Error::ScriptExecution {
            package: "busybox-1.36.1-r0".into(),
            kind: ScriptKind::PostInstall,
            code: Some(3),
        };
        assert_eq!(
            err.to_string(),
            "post-install script of busybox-1.36.1-r0 failed (exit code 3)"
        );
    }
}
