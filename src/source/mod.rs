// src/source/mod.rs

//! Feed abstraction: sources, dependency info, and multi-source composition
//!
//! A `Source` yields version lists, per-framework dependency info, and
//! package bytes. The `SourceGateway` composes several sources with
//! failover; the `GatherCache` memoizes dependency-info fetches within one
//! resolution.

mod cache;
mod gateway;
mod memory;

pub use cache::{GatherCache, GatherKey};
pub use gateway::SourceGateway;
pub use memory::InMemorySource;

use crate::error::Result;
use crate::framework::Framework;
use crate::identity::PackageIdentity;
use crate::version::{PackageVersion, VersionRange};
use async_trait::async_trait;
use std::fmt;

/// A configured package feed. The `url` string is the stable key used for
/// equality and for attribution in plan entries.
#[derive(Debug, Clone)]
pub struct PackageSource {
    pub name: String,
    pub url: String,
}

impl PackageSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl PartialEq for PackageSource {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for PackageSource {}

impl std::hash::Hash for PackageSource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// One declared dependency edge: an id plus the acceptable range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDependency {
    pub id: String,
    pub range: VersionRange,
}

/// A framework-conditional group of dependencies as declared by a package.
/// `target_framework: None` applies to any project framework.
#[derive(Debug, Clone)]
pub struct DependencyGroup {
    pub target_framework: Option<Framework>,
    pub dependencies: Vec<PackageDependency>,
}

/// Select the dependencies that apply to `project` from a group list:
/// the best-matching framework-specific group wins, the unconditional
/// group is the fallback.
pub fn dependencies_for(groups: &[DependencyGroup], project: &Framework) -> Vec<PackageDependency> {
    let frameworks: Vec<&Framework> = groups
        .iter()
        .filter_map(|g| g.target_framework.as_ref())
        .collect();

    if let Some(best) = Framework::best_match(project, frameworks.into_iter()) {
        for group in groups {
            if group.target_framework.as_ref() == Some(best) {
                return group.dependencies.clone();
            }
        }
    }

    groups
        .iter()
        .find(|g| g.target_framework.is_none())
        .map(|g| g.dependencies.clone())
        .unwrap_or_default()
}

/// Dependency info for one identity, already narrowed to a project
/// framework.
#[derive(Debug, Clone)]
pub struct ResolvedDependencyInfo {
    pub identity: PackageIdentity,
    /// Unlisted versions are hidden from latest-selection but usable when
    /// pinned.
    pub listed: bool,
    pub dependencies: Vec<PackageDependency>,
    /// The source that produced this info, for plan attribution.
    pub source: Option<PackageSource>,
}

/// A package feed.
///
/// Implementations are transport-specific and out of scope for the core;
/// they only need to honor this contract. All methods may suspend.
#[async_trait]
pub trait Source: Send + Sync {
    /// The feed's identification, used for cache keys and attribution.
    fn package_source(&self) -> &PackageSource;

    /// All known versions of an id. Unlisted versions are excluded unless
    /// `include_unlisted` is set.
    async fn list_versions(&self, id: &str, include_unlisted: bool)
        -> Result<Vec<PackageVersion>>;

    /// Dependency info for one identity narrowed to `framework`, or `None`
    /// when this source does not know the identity.
    async fn dependency_info(
        &self,
        identity: &PackageIdentity,
        framework: &Framework,
    ) -> Result<Option<ResolvedDependencyInfo>>;

    /// The package container bytes for an identity.
    async fn fetch_package(&self, identity: &PackageIdentity) -> Result<Vec<u8>>;
}
