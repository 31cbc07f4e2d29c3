// src/project/mod.rs

//! Projects and their package manifests
//!
//! A project is a named manifest plus a target framework and a project
//! system that consumes references. The manifest is the flat, ordered list
//! of `PackageReference` entries persisted as `packages.config`.

mod applier;
mod manifest;

pub use applier::Applier;
pub use manifest::ManifestFile;

use crate::error::Result;
use crate::framework::Framework;
use crate::identity::PackageIdentity;
use crate::version::{PackageVersion, VersionRange};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Attribute names the applier owns. Everything else on a manifest entry
/// is preserved verbatim across updates.
pub const ATTR_ID: &str = "id";
pub const ATTR_VERSION: &str = "version";
pub const ATTR_TARGET_FRAMEWORK: &str = "targetFramework";
pub const ATTR_ALLOWED_VERSIONS: &str = "allowedVersions";
pub const ATTR_DEVELOPMENT_DEPENDENCY: &str = "developmentDependency";

/// One manifest entry: an installed package plus its user-authored
/// attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageReference {
    pub identity: PackageIdentity,
    pub target_framework: Option<Framework>,
    pub allowed_versions: Option<VersionRange>,
    pub development_dependency: bool,
    /// The complete ordered attribute list as it appears in the manifest.
    /// Known attributes are mirrored into the typed fields; unknown ones
    /// ride along untouched.
    attributes: Vec<(String, String)>,
    /// Raw child markup of the entry, re-emitted verbatim.
    inner_xml: String,
}

impl PackageReference {
    pub fn new(identity: PackageIdentity, target_framework: Option<Framework>) -> Self {
        let mut attributes = vec![
            (ATTR_ID.to_string(), identity.id.clone()),
            (ATTR_VERSION.to_string(), identity.version.to_string()),
        ];
        if let Some(ref fw) = target_framework {
            attributes.push((ATTR_TARGET_FRAMEWORK.to_string(), fw.to_string()));
        }
        Self {
            identity,
            target_framework,
            allowed_versions: None,
            development_dependency: false,
            attributes,
            inner_xml: String::new(),
        }
    }

    pub(crate) fn from_parts(
        identity: PackageIdentity,
        target_framework: Option<Framework>,
        allowed_versions: Option<VersionRange>,
        development_dependency: bool,
        attributes: Vec<(String, String)>,
        inner_xml: String,
    ) -> Self {
        Self {
            identity,
            target_framework,
            allowed_versions,
            development_dependency,
            attributes,
            inner_xml,
        }
    }

    pub fn with_allowed_versions(mut self, range: VersionRange) -> Self {
        self.set_attribute(ATTR_ALLOWED_VERSIONS, Some(range.to_string()));
        self.allowed_versions = Some(range);
        self
    }

    pub fn with_development_dependency(mut self, value: bool) -> Self {
        if value {
            self.set_attribute(ATTR_DEVELOPMENT_DEPENDENCY, Some("true".to_string()));
        } else {
            self.set_attribute(ATTR_DEVELOPMENT_DEPENDENCY, None);
        }
        self.development_dependency = value;
        self
    }

    /// A copy of this reference moved to a new version, every attribute the
    /// applier does not own preserved in place.
    pub fn with_version(&self, version: PackageVersion, target_framework: &Framework) -> Self {
        let mut moved = self.clone();
        moved.identity = PackageIdentity::new(self.identity.id.clone(), version);
        moved.target_framework = Some(target_framework.clone());
        moved.set_attribute(ATTR_VERSION, Some(moved.identity.version.to_string()));
        moved.set_attribute(ATTR_TARGET_FRAMEWORK, Some(target_framework.to_string()));
        moved
    }

    /// The value of any attribute, known or unknown.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub(crate) fn inner_xml(&self) -> &str {
        &self.inner_xml
    }

    fn set_attribute(&mut self, key: &str, value: Option<String>) {
        match value {
            Some(value) => {
                if let Some(entry) = self.attributes.iter_mut().find(|(k, _)| k == key) {
                    entry.1 = value;
                } else {
                    self.attributes.push((key.to_string(), value));
                }
            }
            None => self.attributes.retain(|(k, _)| k != key),
        }
    }
}

/// The build-system side of a project, invoked by the applier.
///
/// Implementations wire into whatever consumes the references; the core
/// only calls through this contract.
#[async_trait]
pub trait ProjectSystem: Send + Sync {
    /// Add the framework-compatible items of an installed package.
    async fn add_references(&self, identity: &PackageIdentity, items: &[PathBuf]) -> Result<()>;

    /// Remove a package's items ahead of manifest removal.
    async fn remove_references(&self, identity: &PackageIdentity, items: &[PathBuf]) -> Result<()>;

    /// Rewrite binding redirects after installs. Invoked once per applied
    /// plan unless the project context disables it.
    async fn write_binding_redirects(&self) -> Result<()>;
}

/// Records what an operation surfaced for the caller to open, and which
/// install the user asked for directly (as opposed to a dependency pulled
/// in transitively).
#[derive(Debug, Default)]
pub struct ExecutionContext {
    direct_install: Option<PackageIdentity>,
    files_opened: std::sync::Mutex<Vec<PathBuf>>,
}

impl ExecutionContext {
    pub fn direct(identity: PackageIdentity) -> Self {
        Self {
            direct_install: Some(identity),
            files_opened: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn is_direct(&self, identity: &PackageIdentity) -> bool {
        self.direct_install.as_ref() == Some(identity)
    }

    pub fn record_opened(&self, path: PathBuf) {
        if let Ok(mut files) = self.files_opened.lock() {
            files.push(path);
        }
    }

    pub fn files_opened(&self) -> Vec<PathBuf> {
        self.files_opened
            .lock()
            .map(|files| files.clone())
            .unwrap_or_default()
    }
}

/// Per-apply options.
#[derive(Debug, Default)]
pub struct ProjectContext {
    pub binding_redirects_disabled: bool,
    pub execution_context: Option<ExecutionContext>,
}

/// Options for uninstall flows.
#[derive(Debug, Clone, Copy, Default)]
pub struct UninstallationContext {
    /// Also uninstall dependencies that would become orphans.
    pub remove_dependencies: bool,
    /// Skip the dependent guard entirely, knowingly leaving orphans.
    pub force_remove: bool,
}

/// A project: name, target framework, manifest, and project system.
pub struct Project {
    name: String,
    target_framework: Framework,
    manifest: ManifestFile,
    system: Arc<dyn ProjectSystem>,
    /// Guards read-modify-write of the manifest: one applier operation at
    /// a time per project.
    apply_lock: Mutex<()>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        target_framework: Framework,
        manifest_path: impl Into<PathBuf>,
        system: Arc<dyn ProjectSystem>,
    ) -> Self {
        Self {
            name: name.into(),
            target_framework,
            manifest: ManifestFile::new(manifest_path),
            system,
            apply_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_framework(&self) -> &Framework {
        &self.target_framework
    }

    pub fn manifest(&self) -> &ManifestFile {
        &self.manifest
    }

    pub fn manifest_path(&self) -> &Path {
        self.manifest.path()
    }

    pub fn system(&self) -> &Arc<dyn ProjectSystem> {
        &self.system
    }

    /// A consistent snapshot of the installed references. Readers never
    /// block behind the applier; the manifest is replaced atomically.
    pub async fn installed_packages(&self) -> Result<Vec<PackageReference>> {
        self.manifest.read().await
    }

    pub(crate) async fn apply_guard(&self) -> MutexGuard<'_, ()> {
        self.apply_lock.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(id: &str, version: &str) -> PackageIdentity {
        PackageIdentity::new(id, version.parse().unwrap())
    }

    #[test]
    fn test_new_reference_has_canonical_attributes() {
        let fw = Framework::parse("net45").unwrap();
        let r = PackageReference::new(ident("jQuery", "1.4.4"), Some(fw));
        assert_eq!(r.attribute("id"), Some("jQuery"));
        assert_eq!(r.attribute("version"), Some("1.4.4"));
        assert_eq!(r.attribute("targetFramework"), Some("net45"));
    }

    #[test]
    fn test_with_version_preserves_unknown_attributes() {
        let fw = Framework::parse("net45").unwrap();
        let mut r = PackageReference::new(ident("jQuery", "1.4.4"), Some(fw.clone()));
        r.set_attribute("requireReinstallation", Some("true".to_string()));

        let moved = r.with_version("1.6.4".parse().unwrap(), &fw);
        assert_eq!(moved.identity.version.to_string(), "1.6.4");
        assert_eq!(moved.attribute("version"), Some("1.6.4"));
        assert_eq!(moved.attribute("requireReinstallation"), Some("true"));
    }

    #[test]
    fn test_allowed_versions_mirrors_into_attributes() {
        let r = PackageReference::new(ident("jQuery", "1.4.4"), None)
            .with_allowed_versions(VersionRange::parse("[1.0,2.0)").unwrap());
        assert_eq!(r.attribute("allowedVersions"), Some("[1.0.0,2.0.0)"));
        assert!(r.allowed_versions.is_some());
    }

    #[test]
    fn test_execution_context_records_opened_files() {
        let ctx = ExecutionContext::direct(ident("a", "1.0.0"));
        assert!(ctx.is_direct(&ident("a", "1.0.0")));
        assert!(!ctx.is_direct(&ident("b", "1.0.0")));
        ctx.record_opened(PathBuf::from("/store/a.1.0.0/ReadMe.txt"));
        assert_eq!(ctx.files_opened().len(), 1);
    }
}
