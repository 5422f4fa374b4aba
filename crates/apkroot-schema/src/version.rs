//! APK version ordering and constraint matching.
//!
//! APK versions look like `1.36.1-r15`, `3.1.1_rc2-r0` or `2.9a_p1-r3`:
//! dot-separated numeric components, an optional single letter, any
//! number of `_suffix[N]` markers and an optional `-rN` package revision.
//! Pre-release suffixes (`alpha`, `beta`, `pre`, `rc`) sort before the
//! bare version, post-release suffixes (`cvs`, `svn`, `git`, `hg`, `p`)
//! sort after it.

use std::cmp::Ordering;

use thiserror::Error;

/// Errors produced while parsing an APK version string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The version string was empty.
    #[error("empty version string")]
    Empty,

    /// A component could not be parsed.
    #[error("invalid version '{version}': {reason}")]
    Invalid {
        /// The offending version string.
        version: String,
        /// Human-readable description of the problem.
        reason: &'static str,
    },
}

const PRE_SUFFIXES: [&str; 4] = ["alpha", "beta", "pre", "rc"];
const POST_SUFFIXES: [&str; 5] = ["cvs", "svn", "git", "hg", "p"];

/// A version string split into its ordered parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVersion {
    numbers: Vec<u64>,
    letter: Option<char>,
    /// `(rank, number)`: negative ranks are pre-release suffixes.
    suffixes: Vec<(i8, u64)>,
    revision: u64,
}

impl ParsedVersion {
    /// Parse an APK version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] if the string is empty or does not follow
    /// the `digits[.digits][letter][_suffix[N]][-rN]` grammar.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        if input.is_empty() {
            return Err(VersionError::Empty);
        }
        let invalid = |reason| VersionError::Invalid {
            version: input.to_string(),
            reason,
        };

        let (body, revision) = match input.rsplit_once("-r") {
            Some((body, rev)) => (
                body,
                rev.parse::<u64>()
                    .map_err(|_| invalid("revision is not numeric"))?,
            ),
            None => (input, 0),
        };

        let mut parts = body.split('_');
        let head = parts.next().unwrap_or_default();

        let components: Vec<&str> = head.split('.').collect();
        let last = components.len() - 1;
        let mut letter = None;
        let mut numbers = Vec::with_capacity(components.len());
        for (i, component) in components.iter().enumerate() {
            let digits_len = component.bytes().take_while(u8::is_ascii_digit).count();
            if digits_len == 0 {
                return Err(invalid("component does not start with a digit"));
            }
            let (digits, rest) = component.split_at(digits_len);
            match rest.as_bytes() {
                [] => {}
                [c] if i == last && c.is_ascii_lowercase() => letter = Some(char::from(*c)),
                _ => return Err(invalid("unexpected characters after digits")),
            }
            numbers.push(
                digits
                    .parse()
                    .map_err(|_| invalid("numeric component overflow"))?,
            );
        }

        let mut suffixes = Vec::new();
        for suffix in parts {
            let name: String = suffix
                .chars()
                .take_while(char::is_ascii_alphabetic)
                .collect();
            let num = &suffix[name.len()..];
            let number = if num.is_empty() {
                0
            } else {
                num.parse()
                    .map_err(|_| invalid("suffix number is not numeric"))?
            };
            let rank = suffix_rank(&name).ok_or_else(|| invalid("unknown suffix"))?;
            suffixes.push((rank, number));
        }

        Ok(Self {
            numbers,
            letter,
            suffixes,
            revision,
        })
    }
}

fn suffix_rank(name: &str) -> Option<i8> {
    if let Some(pos) = PRE_SUFFIXES.iter().position(|s| *s == name) {
        return Some(pos as i8 - PRE_SUFFIXES.len() as i8);
    }
    POST_SUFFIXES
        .iter()
        .position(|s| *s == name)
        .map(|pos| pos as i8 + 1)
}

impl Ord for ParsedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.numbers.iter().zip(&other.numbers) {
            match a.cmp(b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        match self.numbers.len().cmp(&other.numbers.len()) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (self.letter, other.letter) {
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) if a != b => return a.cmp(&b),
            _ => {}
        }

        let len = self.suffixes.len().max(other.suffixes.len());
        for i in 0..len {
            let a = self.suffixes.get(i).copied().unwrap_or((0, 0));
            let b = other.suffixes.get(i).copied().unwrap_or((0, 0));
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        self.revision.cmp(&other.revision)
    }
}

impl PartialOrd for ParsedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two APK version strings.
///
/// Unparseable versions sort before parseable ones and are compared
/// lexically among themselves, so the ordering stays total.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (ParsedVersion::parse(a), ParsedVersion::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Returns `true` if `candidate` is strictly newer than `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

/// Comparison operator of a versioned dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `~` or `=~`: the candidate starts with the given version.
    Fuzzy,
}

impl Op {
    /// Parse an operator token (`=`, `<`, `<=`, `>`, `>=`, `~`, `=~`).
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "~" | "=~" => Some(Self::Fuzzy),
            _ => None,
        }
    }

    /// Canonical textual form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Fuzzy => "~",
        }
    }

    /// Check whether `candidate` satisfies `self` against `wanted`.
    pub fn matches(self, candidate: &str, wanted: &str) -> bool {
        let ord = compare(candidate, wanted);
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
            Self::Fuzzy => fuzzy_matches(candidate, wanted),
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn fuzzy_matches(candidate: &str, wanted: &str) -> bool {
    let Some(rest) = candidate.strip_prefix(wanted) else {
        return false;
    };
    rest.is_empty() || rest.starts_with(['.', '_', '-']) || wanted.ends_with('.')
}
