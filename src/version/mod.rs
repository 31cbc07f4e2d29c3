// src/version/mod.rs

//! Version handling and constraint satisfaction for package dependencies
//!
//! This module provides parsing and comparison for four-segment package
//! versions (major.minor.patch.revision) with SemVer 2 prerelease ordering,
//! plus version ranges and the exact-segment constraints used by reinstall.

mod constraints;
mod range;

pub use constraints::{DependencyBehavior, VersionConstraints};
pub use range::VersionRange;

use crate::error::{Error, Result};
use semver::{BuildMetadata, Prerelease};
use std::cmp::Ordering;
use std::fmt;

/// A parsed package version with up to four numeric segments
///
/// Ordering follows the numeric tuple, then prerelease: a release version
/// orders above any prerelease of the same tuple, and prerelease identifiers
/// compare per SemVer 2. Build metadata is ignored for ordering and equality.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    pub prerelease: Prerelease,
    pub metadata: BuildMetadata,
}

impl PackageVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            prerelease: Prerelease::EMPTY,
            metadata: BuildMetadata::EMPTY,
        }
    }

    /// Parse a version string
    ///
    /// Accepts 2, 3, or 4 numeric segments, an optional `-prerelease`, and
    /// an optional `+metadata` suffix. Missing segments default to zero.
    ///
    /// Examples:
    /// - "1.2" → 1.2.0
    /// - "1.2.3.4" → revision 4
    /// - "2.0.0-beta.1" → prerelease
    /// - "1.0.0+sha.abc" → metadata (ignored for comparison)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |detail: &str| Error::VersionParse {
            input: s.to_string(),
            detail: detail.to_string(),
        };

        let (rest, metadata) = match s.split_once('+') {
            Some((r, m)) => (
                r,
                BuildMetadata::new(m).map_err(|e| invalid(&e.to_string()))?,
            ),
            None => (s, BuildMetadata::EMPTY),
        };

        let (numeric, prerelease) = match rest.split_once('-') {
            Some((n, p)) => (n, Prerelease::new(p).map_err(|e| invalid(&e.to_string()))?),
            None => (rest, Prerelease::EMPTY),
        };

        let segments: Vec<&str> = numeric.split('.').collect();
        if segments.len() < 2 || segments.len() > 4 {
            return Err(invalid("expected 2 to 4 numeric segments"));
        }

        let mut parts = [0u64; 4];
        for (i, seg) in segments.iter().enumerate() {
            parts[i] = seg
                .parse::<u64>()
                .map_err(|_| invalid(&format!("segment '{seg}' is not numeric")))?;
        }

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            revision: parts[3],
            prerelease,
            metadata,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    fn tuple(&self) -> (u64, u64, u64, u64) {
        (self.major, self.minor, self.patch, self.revision)
    }

    /// Whether two versions share the same numeric tuple, ignoring
    /// prerelease labels. Used for prerelease admission against range bounds.
    pub fn same_release_tuple(&self, other: &PackageVersion) -> bool {
        self.tuple() == other.tuple()
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.tuple() == other.tuple() && self.prerelease == other.prerelease
    }
}

impl Eq for PackageVersion {}

impl std::hash::Hash for PackageVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.tuple().hash(state);
        self.prerelease.hash(state);
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.tuple().cmp(&other.tuple()) {
            Ordering::Equal => {}
            ord => return ord,
        }
        // semver's Prerelease orders the empty label above any prerelease
        // and compares identifiers per SemVer 2.
        self.prerelease.cmp(&other.prerelease)
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageVersion {
    /// The normalized rendering: trailing zero revision dropped, metadata
    /// omitted. Store directory names use this form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision > 0 {
            write!(f, ".{}", self.revision)?;
        }
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
