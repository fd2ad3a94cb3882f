//! Template versioning
//!
//! Installed template versions are indexed as contiguous inclusive ranges,
//! and a pluggable [`VersionResolver`] decides which version a render uses.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BarberError, Result};

/// Closed interval `[min, max]` of template versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionRange {
    min: u64,
    max: u64,
}

impl VersionRange {
    pub fn new(min: u64, max: u64) -> Result<Self> {
        if min > max {
            return Err(BarberError::InvalidVersionRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// A range holding exactly one version
    pub fn single(version: u64) -> Self {
        Self {
            min: version,
            max: version,
        }
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn contains(&self, version: u64) -> bool {
        self.min <= version && version <= self.max
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Coalesce discrete versions into contiguous ranges
pub fn as_ranges(versions: &BTreeSet<u64>) -> BTreeSet<VersionRange> {
    let mut ranges = BTreeSet::new();
    let mut iter = versions.iter().copied();
    let Some(first) = iter.next() else {
        return ranges;
    };

    let mut current = VersionRange::single(first);
    for version in iter {
        if version == current.max + 1 {
            current.max = version;
        } else {
            ranges.insert(current);
            current = VersionRange::single(version);
        }
    }
    ranges.insert(current);
    ranges
}

pub fn supports(ranges: &BTreeSet<VersionRange>, version: u64) -> bool {
    ranges.iter().any(|range| range.contains(version))
}

// =============================================================================
// Resolvers
// =============================================================================

/// Chooses the template version a render uses
pub trait VersionResolver: fmt::Debug + Send + Sync {
    /// Name reported in contract-violation errors
    fn name(&self) -> &str;

    /// Pick a version; `options` is never empty when called through [`resolve_version`]
    fn resolve(&self, requested: Option<u64>, options: &BTreeSet<u64>, token: &str) -> Result<u64>;
}

/// Use the requested version if compatible, otherwise the newest one
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecifiedOrNewest;

impl VersionResolver for SpecifiedOrNewest {
    fn name(&self) -> &str {
        "specified-or-newest"
    }

    fn resolve(&self, requested: Option<u64>, options: &BTreeSet<u64>, token: &str) -> Result<u64> {
        match requested {
            Some(version) if options.contains(&version) => Ok(version),
            _ => newest(options, token),
        }
    }
}

/// Use the requested version, failing if it is not compatible; newest when none was requested
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecifiedThrowOrNewest;

impl VersionResolver for SpecifiedThrowOrNewest {
    fn name(&self) -> &str {
        "specified-throw-or-newest"
    }

    fn resolve(&self, requested: Option<u64>, options: &BTreeSet<u64>, token: &str) -> Result<u64> {
        match requested {
            Some(version) if options.contains(&version) => Ok(version),
            Some(version) => Err(BarberError::IncompatibleVersion {
                requested: version,
                token: token.to_string(),
                compatible: options.clone(),
            }),
            None => newest(options, token),
        }
    }
}

fn newest(options: &BTreeSet<u64>, token: &str) -> Result<u64> {
    options
        .last()
        .copied()
        .ok_or_else(|| BarberError::NoCompatibleVersions {
            token: token.to_string(),
        })
}

/// Resolve through `resolver`, failing fast on empty options and
/// rejecting answers outside of `options`
pub fn resolve_version(
    resolver: &dyn VersionResolver,
    requested: Option<u64>,
    options: &BTreeSet<u64>,
    token: &str,
) -> Result<u64> {
    if options.is_empty() {
        return Err(BarberError::NoCompatibleVersions {
            token: token.to_string(),
        });
    }
    let resolved = resolver.resolve(requested, options, token)?;
    if !options.contains(&resolved) {
        return Err(BarberError::ResolverContract {
            resolver: resolver.name().to_string(),
            token: token.to_string(),
            requested: requested.map_or_else(|| "latest".to_string(), |v| v.to_string()),
            resolved: resolved.to_string(),
        });
    }
    Ok(resolved)
}
