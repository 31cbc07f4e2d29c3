// src/source/memory.rs

//! An in-memory source backed by built package archives.
//!
//! Serves resolver and planner tests, and any tooling that wants an
//! offline feed. Packages are added as container bytes; metadata is
//! indexed on insert.

use crate::error::{Error, Result};
use crate::framework::Framework;
use crate::identity::{id_key, PackageIdentity};
use crate::package::{read_metadata, PackageMetadata};
use crate::source::{dependencies_for, PackageSource, ResolvedDependencyInfo, Source};
use crate::version::PackageVersion;
use async_trait::async_trait;
use std::collections::HashMap;

struct StoredPackage {
    identity: PackageIdentity,
    listed: bool,
    metadata: PackageMetadata,
    bytes: Vec<u8>,
}

/// A source whose packages live in memory.
pub struct InMemorySource {
    source: PackageSource,
    packages: HashMap<String, Vec<StoredPackage>>,
}

impl InMemorySource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source: PackageSource::new(name, url),
            packages: HashMap::new(),
        }
    }

    /// Add a package from its container bytes.
    pub fn add_package_bytes(&mut self, bytes: Vec<u8>) -> Result<PackageIdentity> {
        self.insert(bytes, true)
    }

    /// Add a package hidden from latest-selection but usable when pinned.
    pub fn add_unlisted_package_bytes(&mut self, bytes: Vec<u8>) -> Result<PackageIdentity> {
        self.insert(bytes, false)
    }

    fn insert(&mut self, bytes: Vec<u8>, listed: bool) -> Result<PackageIdentity> {
        let metadata = read_metadata(&bytes)?;
        let identity = metadata.identity()?;
        let stored = StoredPackage {
            identity: identity.clone(),
            listed,
            metadata,
            bytes,
        };
        let entries = self.packages.entry(id_key(&identity.id)).or_default();
        entries.retain(|p| p.identity != identity);
        entries.push(stored);
        Ok(identity)
    }

    fn find(&self, identity: &PackageIdentity) -> Option<&StoredPackage> {
        self.packages
            .get(&id_key(&identity.id))
            .and_then(|entries| entries.iter().find(|p| &p.identity == identity))
    }
}

#[async_trait]
impl Source for InMemorySource {
    fn package_source(&self) -> &PackageSource {
        &self.source
    }

    async fn list_versions(
        &self,
        id: &str,
        include_unlisted: bool,
    ) -> Result<Vec<PackageVersion>> {
        let mut versions: Vec<PackageVersion> = self
            .packages
            .get(&id_key(id))
            .map(|entries| {
                entries
                    .iter()
                    .filter(|p| include_unlisted || p.listed)
                    .map(|p| p.identity.version.clone())
                    .collect()
            })
            .unwrap_or_default();
        versions.sort();
        Ok(versions)
    }

    async fn dependency_info(
        &self,
        identity: &PackageIdentity,
        framework: &Framework,
    ) -> Result<Option<ResolvedDependencyInfo>> {
        let Some(stored) = self.find(identity) else {
            return Ok(None);
        };
        let groups = stored.metadata.typed_groups()?;
        Ok(Some(ResolvedDependencyInfo {
            identity: stored.identity.clone(),
            listed: stored.listed,
            dependencies: dependencies_for(&groups, framework),
            source: None,
        }))
    }

    async fn fetch_package(&self, identity: &PackageIdentity) -> Result<Vec<u8>> {
        self.find(identity)
            .map(|p| p.bytes.clone())
            .ok_or_else(|| Error::PackageNotFound {
                identity: identity.to_string(),
            })
    }
}
