// src/package.rs

//! Package container reading and writing.
//!
//! A package is a gzipped tar archive carrying a `package.json` metadata
//! document at its root plus content entries, framework-partitioned under
//! `lib/<framework>/`. The core only needs to read the metadata document
//! and unpack entries; everything else about the container is delegated.

use crate::error::{Error, Result};
use crate::framework::Framework;
use crate::identity::PackageIdentity;
use crate::source::{DependencyGroup, PackageDependency};
use crate::version::{PackageVersion, VersionRange};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tar::{Archive, Builder, Header};

/// Name of the metadata document at the archive root.
pub const METADATA_ENTRY: &str = "package.json";

/// Root-level readme recognized for surfacing on direct installs.
pub const README_ENTRY: &str = "ReadMe.txt";

/// The declarative metadata document at the root of every package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_client_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_types: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub development_dependency: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_groups: Vec<MetadataDependencyGroup>,
}

/// One framework-conditional group of dependency declarations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataDependencyGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<MetadataDependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataDependency {
    pub id: String,
    pub range: String,
}

impl PackageMetadata {
    pub fn new(id: impl Into<String>, version: &PackageVersion) -> Self {
        Self {
            id: id.into(),
            version: version.to_string(),
            min_client_version: None,
            package_types: Vec::new(),
            development_dependency: false,
            dependency_groups: Vec::new(),
        }
    }

    pub fn identity(&self) -> Result<PackageIdentity> {
        Ok(PackageIdentity::new(
            self.id.clone(),
            PackageVersion::parse(&self.version)?,
        ))
    }

    pub fn min_client_version(&self) -> Result<Option<PackageVersion>> {
        self.min_client_version
            .as_deref()
            .map(PackageVersion::parse)
            .transpose()
    }

    /// Parse the declared groups into the typed dependency model.
    pub fn typed_groups(&self) -> Result<Vec<DependencyGroup>> {
        self.dependency_groups
            .iter()
            .map(|g| {
                Ok(DependencyGroup {
                    target_framework: g
                        .target_framework
                        .as_deref()
                        .map(Framework::parse)
                        .transpose()?,
                    dependencies: g
                        .dependencies
                        .iter()
                        .map(|d| {
                            Ok(PackageDependency {
                                id: d.id.clone(),
                                range: VersionRange::parse(&d.range)?,
                            })
                        })
                        .collect::<Result<Vec<_>>>()?,
                })
            })
            .collect()
    }
}

/// Builds a package archive in memory. Sources and tests use this; the
/// live feed side produces the same container shape.
pub struct PackageBuilder {
    metadata: PackageMetadata,
    files: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn new(metadata: PackageMetadata) -> Self {
        Self {
            metadata,
            files: Vec::new(),
        }
    }

    /// Add a content entry, e.g. `lib/net45/Widget.dll`.
    pub fn file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }

    pub fn build(self) -> Result<Vec<u8>> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);

        let doc = serde_json::to_vec_pretty(&self.metadata)?;
        append_entry(&mut builder, METADATA_ENTRY, &doc)?;
        for (path, content) in &self.files {
            append_entry(&mut builder, path, content)?;
        }

        let encoder = builder.into_inner()?;
        Ok(encoder.finish()?)
    }
}

fn append_entry<W: std::io::Write>(
    builder: &mut Builder<W>,
    path: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, content)?;
    Ok(())
}

/// Read just the metadata document from package bytes. Callers that know
/// which identity the bytes were fetched for should wrap failures with
/// that context.
pub fn read_metadata(bytes: &[u8]) -> Result<PackageMetadata> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_ref() == Path::new(METADATA_ENTRY) {
            let mut doc = Vec::new();
            entry.read_to_end(&mut doc)?;
            return serde_json::from_slice(&doc).map_err(Error::from);
        }
    }
    Err(Error::PackageRead {
        identity: "<unidentified>".to_string(),
        detail: format!("archive has no {METADATA_ENTRY}"),
    })
}

/// Unpack package bytes into a directory. The directory is created if
/// missing; entries are written relative to it.
pub fn extract_to(identity: &PackageIdentity, bytes: &[u8], dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut archive = Archive::new(GzDecoder::new(bytes));
    archive.unpack(dir).map_err(|e| Error::PackageRead {
        identity: identity.to_string(),
        detail: format!("failed to unpack into {}: {e}", dir.display()),
    })
}
