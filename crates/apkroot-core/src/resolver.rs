//! Dependency Resolver.
//!
//! Computes the transitive closure of a request over a package universe
//! (one or more indexes in fetch order) and returns it in install order:
//! every package comes after the packages it depends on. Conflicts are
//! returned as data.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

use apkroot_schema::{Dependency, PackageDescriptor, PackageIndex, PackageName, Version};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Why two resolved packages cannot coexist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConflictReason {
    /// One package declares `!other`.
    Excludes,
    /// Both packages provide the same capability.
    SharedCapability {
        /// The capability provided twice.
        capability: PackageName,
    },
}

/// A pair of resolved packages that conflict. The first package is the one
/// earlier in install order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// The two packages involved.
    pub packages: (PackageName, PackageName),
    /// What they conflict over.
    pub reason: ConflictReason,
}

impl Conflict {
    /// Returns `true` if `name` is one of the two packages.
    pub fn involves(&self, name: &str) -> bool {
        self.packages.0 == name || self.packages.1 == name
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b) = &self.packages;
        match &self.reason {
            ConflictReason::Excludes => write!(f, "{a} and {b} are mutually exclusive"),
            ConflictReason::SharedCapability { capability } => {
                write!(f, "{a} and {b} both provide {capability}")
            }
        }
    }
}

/// The outcome of a resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Packages in install order, each at most once.
    pub packages: Vec<PackageDescriptor>,
    /// Conflicts between resolved packages.
    pub conflicts: Vec<Conflict>,
}

/// Resolve `requested` dependency atoms against `universe`.
///
/// Requested entries may carry constraints (`curl>=8`). Dependencies are
/// visited depth-first and emitted post-order, so the result is
/// deterministic for a given request and universe. Cycles are tolerated:
/// a package already on the current path is not visited again.
///
/// # Errors
///
/// [`Error::UnresolvedDependency`] when an atom matches no package and no
/// provider.
pub fn resolve(requested: &[String], universe: &[PackageIndex]) -> Result<Resolution> {
    let mut resolver = Resolver::new(universe);
    for atom in requested {
        resolver.visit(&Dependency::parse(atom), "request")?;
    }

    let conflicts = detect_conflicts(&resolver.order);
    debug!(
        packages = resolver.order.len(),
        conflicts = conflicts.len(),
        "resolved"
    );

    Ok(Resolution {
        packages: resolver.order.into_iter().cloned().collect(),
        conflicts,
    })
}

/// A descriptor and the position of its index in fetch order.
type Candidate<'a> = (usize, &'a PackageDescriptor);

/// Name and capability lookup tables over all indexes.
struct Universe<'a> {
    by_name: HashMap<&'a str, Vec<Candidate<'a>>>,
    by_provide: HashMap<&'a str, Vec<(usize, &'a PackageDescriptor, Option<&'a str>)>>,
}

impl<'a> Universe<'a> {
    fn new(indexes: &'a [PackageIndex]) -> Self {
        let mut by_name: HashMap<&str, Vec<Candidate<'a>>> = HashMap::new();
        let mut by_provide: HashMap<&str, Vec<_>> = HashMap::new();

        for (order, index) in indexes.iter().enumerate() {
            for pkg in &index.packages {
                by_name.entry(pkg.name.as_str()).or_default().push((order, pkg));
                for provide in &pkg.provides {
                    by_provide.entry(provide.name.as_str()).or_default().push((
                        order,
                        pkg,
                        provide.version.as_deref(),
                    ));
                }
            }
        }

        Self {
            by_name,
            by_provide,
        }
    }

    /// Pick the descriptor that satisfies `dep`.
    ///
    /// A real package of that name wins: the first index in fetch order with
    /// a satisfying version, and the highest such version within it. Then
    /// providers: highest `provider_priority`, then fetch order, then the
    /// highest package version.
    fn select(&self, dep: &Dependency) -> Option<&'a PackageDescriptor> {
        if let Some(candidates) = self.by_name.get(dep.name.as_str()) {
            let mut best: Option<Candidate<'a>> = None;
            for &(order, pkg) in candidates {
                if !dep.accepts(Some(pkg.version.as_str())) {
                    continue;
                }
                match best {
                    None => best = Some((order, pkg)),
                    Some((best_order, best_pkg))
                        if order == best_order && pkg.version > best_pkg.version =>
                    {
                        best = Some((order, pkg));
                    }
                    Some(_) => {}
                }
            }
            if let Some((_, pkg)) = best {
                return Some(pkg);
            }
        }

        self.by_provide
            .get(dep.name.as_str())?
            .iter()
            .filter(|(_, _, version)| dep.accepts(*version))
            .min_by(|a, b| provider_rank(a.0, a.1).cmp(&provider_rank(b.0, b.1)))
            .map(|(_, pkg, _)| *pkg)
    }
}

/// Sort key for providers: smaller is better.
fn provider_rank(order: usize, pkg: &PackageDescriptor) -> (Reverse<u32>, usize, Reverse<&Version>) {
    (
        Reverse(pkg.provider_priority.unwrap_or(0)),
        order,
        Reverse(&pkg.version),
    )
}

struct Resolver<'a> {
    universe: Universe<'a>,
    /// Every package picked so far, including those still being visited.
    chosen: HashMap<&'a str, &'a PackageDescriptor>,
    chosen_order: Vec<&'a PackageDescriptor>,
    order: Vec<&'a PackageDescriptor>,
}

impl<'a> Resolver<'a> {
    fn new(indexes: &'a [PackageIndex]) -> Self {
        Self {
            universe: Universe::new(indexes),
            chosen: HashMap::new(),
            chosen_order: Vec::new(),
            order: Vec::new(),
        }
    }

    /// A package already picked that satisfies `dep`.
    fn satisfied_by(&self, dep: &Dependency) -> Option<&'a PackageDescriptor> {
        if let Some(pkg) = self.chosen.get(dep.name.as_str()) {
            if !dep.accepts(Some(pkg.version.as_str())) {
                warn!(
                    dependency = %dep,
                    installed = %pkg.version,
                    "dependency constraint not met by already selected package"
                );
            }
            return Some(pkg);
        }
        self.chosen_order.iter().copied().find(|pkg| {
            pkg.provides
                .iter()
                .any(|p| p.name == dep.name && dep.accepts(p.version.as_deref()))
        })
    }

    fn visit(&mut self, dep: &Dependency, required_by: &str) -> Result<()> {
        if self.satisfied_by(dep).is_some() {
            return Ok(());
        }

        let pkg = self
            .universe
            .select(dep)
            .ok_or_else(|| Error::UnresolvedDependency {
                name: dep.to_string(),
                required_by: required_by.to_string(),
            })?;

        if self.chosen.contains_key(pkg.name.as_str()) {
            return Ok(());
        }
        self.chosen.insert(pkg.name.as_str(), pkg);
        self.chosen_order.push(pkg);

        for child in pkg.requires() {
            self.visit(child, pkg.name.as_str())?;
        }

        self.order.push(pkg);
        Ok(())
    }
}

fn excludes(a: &PackageDescriptor, b: &PackageDescriptor) -> bool {
    a.conflicts().any(|c| {
        (c.name == b.name && c.accepts(Some(b.version.as_str())))
            || b.provides
                .iter()
                .any(|p| p.name == c.name && c.accepts(p.version.as_deref()))
    })
}

fn shared_capability<'p>(a: &'p PackageDescriptor, b: &PackageDescriptor) -> Option<&'p PackageName> {
    a.provides
        .iter()
        .find(|pa| b.provides.iter().any(|pb| pb.name == pa.name))
        .map(|p| &p.name)
}

/// One record per unordered pair and reason, in install order.
fn detect_conflicts(order: &[&PackageDescriptor]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for (i, a) in order.iter().enumerate() {
        for b in &order[i + 1..] {
            let pair = (a.name.clone(), b.name.clone());
            if excludes(a, b) || excludes(b, a) {
                conflicts.push(Conflict {
                    packages: pair.clone(),
                    reason: ConflictReason::Excludes,
                });
            }
            if let Some(capability) = shared_capability(a, b) {
                conflicts.push(Conflict {
                    packages: pair,
                    reason: ConflictReason::SharedCapability {
                        capability: capability.clone(),
                    },
                });
            }
        }
    }
    conflicts
}

impl Resolution {
    /// Names in install order.
    pub fn names(&self) -> Vec<&str> {
        self.packages.iter().map(|p| p.name.as_str()).collect()
    }

    /// Position of `name` in install order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.packages.iter().position(|p| p.name == name)
    }
}
