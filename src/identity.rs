// src/identity.rs

//! Package identities: the `(id, version)` pair that names a plan entry.
//!
//! Package ids compare case-insensitively (ASCII fold); version equality is
//! the normalized equality of the version module.

use crate::version::PackageVersion;
use std::cmp::Ordering;
use std::fmt;

/// Case-insensitive id equality, the one rule for comparing package ids.
pub fn same_id(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// The lowercase form used to key maps and sets by package id.
pub fn id_key(id: &str) -> String {
    id.to_ascii_lowercase()
}

/// A concrete package: id plus version
#[derive(Debug, Clone)]
pub struct PackageIdentity {
    pub id: String,
    pub version: PackageVersion,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: PackageVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// The store directory name for this identity: `<Id>.<NormalizedVersion>`.
    pub fn directory_name(&self) -> String {
        format!("{}.{}", self.id, self.version)
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        same_id(&self.id, &other.id) && self.version == other.version
    }
}

impl Eq for PackageIdentity {}

impl std::hash::Hash for PackageIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        id_key(&self.id).hash(state);
        self.version.hash(state);
    }
}

impl Ord for PackageIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        id_key(&self.id)
            .cmp(&id_key(&other.id))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for PackageIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.version)
    }
}
