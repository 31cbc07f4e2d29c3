// src/solution.rs

//! Solution-wide coordination.
//!
//! The solution owns the shared folder store and the set of projects using
//! it. Store deletes consult the other projects' manifests so content
//! still referenced elsewhere survives an uninstall. Nothing here is a
//! process global; callers hold the `SolutionManager` they build.

use crate::error::Result;
use crate::identity::PackageIdentity;
use crate::project::Project;
use crate::store::FolderStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct SolutionManager {
    store: FolderStore,
    projects: RwLock<Vec<Arc<Project>>>,
}

impl SolutionManager {
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        Self {
            store: FolderStore::new(store_root),
            projects: RwLock::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &FolderStore {
        &self.store
    }

    pub async fn add_project(&self, project: Arc<Project>) {
        self.projects.write().await.push(project);
    }

    pub async fn projects(&self) -> Vec<Arc<Project>> {
        self.projects.read().await.clone()
    }

    pub async fn project(&self, name: &str) -> Option<Arc<Project>> {
        self.projects
            .read()
            .await
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// Whether any project other than `excluding` still references the
    /// identity. Manifest reads are snapshots; a torn view is impossible.
    pub async fn referenced_elsewhere(
        &self,
        identity: &PackageIdentity,
        excluding: &str,
    ) -> Result<bool> {
        for project in self.projects.read().await.iter() {
            if project.name() == excluding {
                continue;
            }
            let references = project.installed_packages().await?;
            if references.iter().any(|r| r.identity == *identity) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CrateResult;
    use crate::framework::Framework;
    use crate::project::{PackageReference, ProjectSystem};
    use async_trait::async_trait;
    use std::path::Path;

    struct NullSystem;

    #[async_trait]
    impl ProjectSystem for NullSystem {
        async fn add_references(
            &self,
            _identity: &PackageIdentity,
            _items: &[std::path::PathBuf],
        ) -> CrateResult<()> {
            Ok(())
        }

        async fn remove_references(
            &self,
            _identity: &PackageIdentity,
            _items: &[std::path::PathBuf],
        ) -> CrateResult<()> {
            Ok(())
        }

        async fn write_binding_redirects(&self) -> CrateResult<()> {
            Ok(())
        }
    }

    fn project(dir: &Path, name: &str) -> Arc<Project> {
        Arc::new(Project::new(
            name,
            Framework::Any,
            dir.join(name).join("packages.config"),
            Arc::new(NullSystem),
        ))
    }

    fn ident(id: &str, version: &str) -> PackageIdentity {
        PackageIdentity::new(id, version.parse().unwrap())
    }

    #[tokio::test]
    async fn test_referenced_elsewhere_sees_other_projects() {
        let dir = tempfile::tempdir().unwrap();
        let solution = SolutionManager::new(dir.path().join("packages"));

        let alpha = project(dir.path(), "alpha");
        let beta = project(dir.path(), "beta");
        solution.add_project(alpha.clone()).await;
        solution.add_project(beta.clone()).await;

        let shared = ident("Shared", "1.0.0");
        beta.manifest()
            .write(&[PackageReference::new(shared.clone(), None)])
            .await
            .unwrap();

        assert!(solution.referenced_elsewhere(&shared, "alpha").await.unwrap());
        assert!(!solution.referenced_elsewhere(&shared, "beta").await.unwrap());
    }

    #[tokio::test]
    async fn test_lookup_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let solution = SolutionManager::new(dir.path().join("packages"));
        solution.add_project(project(dir.path(), "alpha")).await;

        assert!(solution.project("alpha").await.is_some());
        assert!(solution.project("ghost").await.is_none());
    }
}
