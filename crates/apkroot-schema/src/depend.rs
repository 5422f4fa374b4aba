//! Dependency and provides atoms as they appear in `D:`, `p:` and `i:` lines.

use serde::{Deserialize, Serialize};

use crate::types::{PackageName, Version};
use crate::version::Op;

/// A version requirement attached to a dependency (`>=3.1.1-r0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    /// Comparison operator.
    #[serde(with = "op_serde")]
    pub op: Op,
    /// Version compared against.
    pub version: Version,
}

impl Constraint {
    /// Returns `true` if `candidate` satisfies this requirement.
    pub fn matches(&self, candidate: &str) -> bool {
        self.op.matches(candidate, self.version.as_str())
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

/// One entry of a package's dependency list.
///
/// ```
/// use apkroot_schema::Dependency;
///
/// let dep = Dependency::parse("libcrypto3>=3.1.1-r0");
/// assert_eq!(dep.name.as_str(), "libcrypto3");
/// assert!(!dep.conflict);
///
/// let conflict = Dependency::parse("!busybox-extras");
/// assert!(conflict.conflict);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// Package or capability name.
    pub name: PackageName,
    /// Optional version requirement.
    pub constraint: Option<Constraint>,
    /// `true` for `!name` entries: the named package must not be installed.
    pub conflict: bool,
}

impl Dependency {
    /// Parse a single dependency atom.
    pub fn parse(atom: &str) -> Self {
        let (conflict, atom) = match atom.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, atom),
        };

        let Some(op_start) = atom.find(['<', '>', '=', '~']) else {
            return Self {
                name: PackageName::new(atom),
                constraint: None,
                conflict,
            };
        };

        let (name, rest) = atom.split_at(op_start);
        let op_len = rest
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '~'))
            .unwrap_or(rest.len());
        let (op_token, version) = rest.split_at(op_len);

        let constraint = Op::parse(op_token)
            .filter(|_| !version.is_empty())
            .map(|op| Constraint {
                op,
                version: Version::new(version),
            });

        Self {
            name: PackageName::new(name),
            constraint,
            conflict,
        }
    }

    /// Returns `true` if a package or provide at `version` satisfies this atom.
    ///
    /// `None` means the provider is unversioned; it only satisfies
    /// unconstrained dependencies.
    pub fn accepts(&self, version: Option<&str>) -> bool {
        match (&self.constraint, version) {
            (None, _) => true,
            (Some(c), Some(v)) => c.matches(v),
            (Some(_), None) => false,
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.conflict {
            f.write_str("!")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(c) = &self.constraint {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// A capability offered by a package (`so:libssl.so.3=3`, `cmd:curl=8.1.2-r0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provide {
    /// Capability name.
    pub name: PackageName,
    /// Provided version; unversioned provides are virtual.
    pub version: Option<Version>,
}

impl Provide {
    /// Parse a single provides atom.
    pub fn parse(atom: &str) -> Self {
        match atom.split_once('=') {
            Some((name, version)) if !version.is_empty() => Self {
                name: PackageName::new(name),
                version: Some(Version::new(version)),
            },
            Some((name, _)) => Self {
                name: PackageName::new(name),
                version: None,
            },
            None => Self {
                name: PackageName::new(atom),
                version: None,
            },
        }
    }
}

impl std::fmt::Display for Provide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}={v}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

mod op_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::version::Op;

    pub(super) fn serialize<S: Serializer>(op: &Op, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(op.as_str())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Op, D::Error> {
        let token = String::deserialize(deserializer)?;
        Op::parse(&token)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown operator '{token}'")))
    }
}
