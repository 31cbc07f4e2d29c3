// tests/common/mod.rs

//! Shared fixtures for the end-to-end scenario tests.
//!
//! Builds an in-memory feed, a tempdir-backed solution store, and a test
//! project wired to a recording project system.

use async_trait::async_trait;
use nupack::package::{
    MetadataDependency, MetadataDependencyGroup, PackageBuilder, PackageMetadata,
};
use nupack::{
    Framework, PackageIdentity, PackageManager, Project, ProjectSystem, Result, SolutionManager,
    SourceGateway,
};
use nupack::source::InMemorySource;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Project system that records what the applier hands it.
#[derive(Default)]
pub struct RecordingSystem {
    pub added: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
    pub redirects: AtomicUsize,
}

#[async_trait]
impl ProjectSystem for RecordingSystem {
    async fn add_references(&self, identity: &PackageIdentity, _items: &[PathBuf]) -> Result<()> {
        self.added.lock().unwrap().push(identity.to_string());
        Ok(())
    }

    async fn remove_references(
        &self,
        identity: &PackageIdentity,
        _items: &[PathBuf],
    ) -> Result<()> {
        self.removed.lock().unwrap().push(identity.to_string());
        Ok(())
    }

    async fn write_binding_redirects(&self) -> Result<()> {
        self.redirects
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub manager: PackageManager,
    pub project: Arc<Project>,
    pub system: Arc<RecordingSystem>,
}

pub fn ident(id: &str, version: &str) -> PackageIdentity {
    PackageIdentity::new(id, version.parse().unwrap())
}

/// Build package container bytes with a flat dependency list.
pub fn package(id: &str, version: &str, deps: &[(&str, &str)]) -> Vec<u8> {
    let mut meta = PackageMetadata::new(id, &version.parse().unwrap());
    if !deps.is_empty() {
        meta.dependency_groups.push(MetadataDependencyGroup {
            target_framework: None,
            dependencies: deps
                .iter()
                .map(|(dep_id, range)| MetadataDependency {
                    id: dep_id.to_string(),
                    range: range.to_string(),
                })
                .collect(),
        });
    }
    PackageBuilder::new(meta)
        .file(
            format!("lib/net45/{id}.dll"),
            format!("{id} {version}").into_bytes(),
        )
        .build()
        .unwrap()
}

/// A solution with one project and one in-memory source.
pub async fn harness(project_name: &str, packages: Vec<Vec<u8>>) -> Harness {
    let dir = tempfile::tempdir().unwrap();

    let mut source = InMemorySource::new("test-feed", "memory://test-feed");
    for bytes in packages {
        source.add_package_bytes(bytes).unwrap();
    }
    let gateway =
        SourceGateway::new(vec![Arc::new(source) as Arc<dyn nupack::source::Source>]);

    let solution = SolutionManager::new(dir.path().join("packages"));
    let system = Arc::new(RecordingSystem::default());
    let project = Arc::new(Project::new(
        project_name,
        Framework::parse("net45").unwrap(),
        dir.path().join(project_name).join("packages.config"),
        system.clone(),
    ));
    solution.add_project(project.clone()).await;

    Harness {
        dir,
        manager: PackageManager::new(gateway, solution),
        project,
        system,
    }
}

/// Manifest entry identities in manifest order, rendered `id/version`.
pub async fn manifest_entries(project: &Project) -> Vec<String> {
    project
        .installed_packages()
        .await
        .unwrap()
        .iter()
        .map(|r| r.identity.to_string())
        .collect()
}
