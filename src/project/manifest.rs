// src/project/manifest.rs

//! The `packages.config` manifest: an ordered XML list of package entries.
//!
//! Element order is dependency order after a successful apply. Unknown
//! attributes and unknown child elements on `<package>` round-trip
//! untouched; a malformed document is rejected whole with the file path in
//! the error.

use crate::error::{Error, Result};
use crate::framework::Framework;
use crate::identity::{id_key, PackageIdentity};
use crate::project::{
    PackageReference, ATTR_ALLOWED_VERSIONS, ATTR_DEVELOPMENT_DEPENDENCY, ATTR_ID,
    ATTR_TARGET_FRAMEWORK, ATTR_VERSION,
};
use crate::version::{PackageVersion, VersionRange};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A manifest file on disk. Reads return a consistent snapshot; writes go
/// through a temp file and an atomic rename, so concurrent readers see the
/// pre- or post-image, never a torn state.
#[derive(Debug, Clone)]
pub struct ManifestFile {
    path: PathBuf,
}

impl ManifestFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all references in manifest order. A missing file is an empty
    /// manifest.
    pub async fn read(&self) -> Result<Vec<PackageReference>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => parse_manifest(&content, &self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the manifest contents atomically.
    pub async fn write(&self, references: &[PackageReference]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.path.with_extension("config.tmp");
        tokio::fs::write(&temp, render_manifest(references)).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

/// Parse manifest XML. Any structural problem rejects the whole document.
pub fn parse_manifest(content: &str, path: &Path) -> Result<Vec<PackageReference>> {
    let fail = |detail: String| Error::ManifestParseError {
        path: path.to_path_buf(),
        detail,
    };

    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut references = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut in_packages = false;

    loop {
        match reader.read_event() {
            Err(e) => return Err(fail(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) if e.name().as_ref() == b"packages" => {
                in_packages = true;
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"packages" => {
                in_packages = false;
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"package" => {
                if !in_packages {
                    return Err(fail("<package> element outside <packages>".to_string()));
                }
                let attributes = collect_attributes(&e, path)?;
                push_reference(
                    build_reference(attributes, String::new(), path)?,
                    &mut references,
                    &mut seen_ids,
                    path,
                )?;
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"package" => {
                if !in_packages {
                    return Err(fail("<package> element outside <packages>".to_string()));
                }
                let attributes = collect_attributes(&e, path)?;
                // The open form keeps its raw child markup for verbatim
                // re-emission.
                let inner_xml = reader
                    .read_text(e.name())
                    .map_err(|err| fail(err.to_string()))?
                    .into_owned();
                push_reference(
                    build_reference(attributes, inner_xml, path)?,
                    &mut references,
                    &mut seen_ids,
                    path,
                )?;
            }
            Ok(Event::Start(e)) => {
                // Unknown subtree: skip it whole.
                let end = e.to_end().into_owned();
                reader
                    .read_to_end(end.name())
                    .map_err(|err| fail(err.to_string()))?;
            }
            Ok(_) => {}
        }
    }

    Ok(references)
}

fn collect_attributes(
    element: &quick_xml::events::BytesStart<'_>,
    path: &Path,
) -> Result<Vec<(String, String)>> {
    let fail = |detail: String| Error::ManifestParseError {
        path: path.to_path_buf(),
        detail,
    };
    let mut attributes = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|err| fail(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| fail(err.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

fn push_reference(
    reference: PackageReference,
    references: &mut Vec<PackageReference>,
    seen_ids: &mut HashSet<String>,
    path: &Path,
) -> Result<()> {
    if !seen_ids.insert(id_key(&reference.identity.id)) {
        return Err(Error::ManifestParseError {
            path: path.to_path_buf(),
            detail: format!("duplicate package id '{}'", reference.identity.id),
        });
    }
    references.push(reference);
    Ok(())
}

fn build_reference(
    attributes: Vec<(String, String)>,
    inner_xml: String,
    path: &Path,
) -> Result<PackageReference> {
    let fail = |detail: String| Error::ManifestParseError {
        path: path.to_path_buf(),
        detail,
    };
    let get = |key: &str| {
        attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    let id = get(ATTR_ID)
        .ok_or_else(|| fail("<package> is missing the id attribute".to_string()))?
        .to_string();
    let version_str = get(ATTR_VERSION)
        .ok_or_else(|| fail(format!("package '{id}' is missing the version attribute")))?;
    let version = PackageVersion::parse(version_str)
        .map_err(|e| fail(format!("package '{id}': {e}")))?;

    let target_framework = get(ATTR_TARGET_FRAMEWORK)
        .map(Framework::parse)
        .transpose()
        .map_err(|e| fail(format!("package '{id}': {e}")))?;
    let allowed_versions = get(ATTR_ALLOWED_VERSIONS)
        .map(VersionRange::parse)
        .transpose()
        .map_err(|e| fail(format!("package '{id}': {e}")))?;
    let development_dependency = match get(ATTR_DEVELOPMENT_DEPENDENCY) {
        None => false,
        Some(v) if v.eq_ignore_ascii_case("true") => true,
        Some(v) if v.eq_ignore_ascii_case("false") => false,
        Some(v) => {
            return Err(fail(format!(
                "package '{id}': invalid developmentDependency value '{v}'"
            )))
        }
    };

    Ok(PackageReference::from_parts(
        PackageIdentity::new(id, version),
        target_framework,
        allowed_versions,
        development_dependency,
        attributes,
        inner_xml,
    ))
}

/// Render references back to manifest XML, entry order preserved.
pub fn render_manifest(references: &[PackageReference]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<packages>\n");
    for reference in references {
        out.push_str("  <package");
        for (key, value) in reference.attributes() {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if reference.inner_xml().is_empty() {
            out.push_str(" />\n");
        } else {
            out.push('>');
            out.push_str(reference.inner_xml());
            out.push_str("</package>\n");
        }
    }
    out.push_str("</packages>");
    out
}
