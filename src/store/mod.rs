// src/store/mod.rs

//! The solution-scoped package store
//!
//! One directory per identity under a shared `packages/` root, named
//! `<Id>.<NormalizedVersion>`. Presence of the directory means the
//! identity is restored. Extraction is idempotent and guarded by a
//! per-identity mutex; deletion is coordinated by the solution so a
//! directory still referenced by another project survives.

use crate::error::{Error, Result};
use crate::framework::Framework;
use crate::identity::PackageIdentity;
use crate::package::{self, PackageMetadata, METADATA_ENTRY, README_ENTRY};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Extracted package content shared by every project in the solution.
pub struct FolderStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FolderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<Id>.<NormalizedVersion>`
    pub fn package_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.root.join(identity.directory_name())
    }

    async fn lock_for(&self, identity: &PackageIdentity) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(identity.directory_name())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Whether the identity's content is on disk.
    pub async fn is_restored(&self, identity: &PackageIdentity) -> bool {
        self.package_dir(identity).is_dir()
    }

    /// Materialize package bytes into the store. A directory already
    /// present is left alone; concurrent callers for one identity
    /// serialize on the per-identity mutex. The directory appears
    /// atomically via extract-to-temp plus rename.
    pub async fn add_package(
        &self,
        identity: &PackageIdentity,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let lock = self.lock_for(identity).await;
        let _guard = lock.lock().await;

        let dir = self.package_dir(identity);
        if dir.is_dir() {
            debug!(identity = %identity, "package already in store");
            return Ok(dir);
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let staging = self.root.join(format!("{}.staging", identity.directory_name()));
        if staging.exists() {
            tokio::fs::remove_dir_all(&staging).await?;
        }

        package::extract_to(identity, bytes, &staging)?;
        tokio::fs::rename(&staging, &dir).await?;
        info!(identity = %identity, dir = %dir.display(), "extracted package into store");
        Ok(dir)
    }

    /// Remove an identity's directory. Safe to call when absent.
    pub async fn remove_package(&self, identity: &PackageIdentity) -> Result<()> {
        let lock = self.lock_for(identity).await;
        let _guard = lock.lock().await;

        let dir = self.package_dir(identity);
        if dir.is_dir() {
            tokio::fs::remove_dir_all(&dir).await?;
            info!(identity = %identity, "removed package from store");
        }
        Ok(())
    }

    /// The metadata document of a restored identity, or `None` when the
    /// store has no content for it.
    pub async fn read_metadata(
        &self,
        identity: &PackageIdentity,
    ) -> Result<Option<PackageMetadata>> {
        let doc = self.package_dir(identity).join(METADATA_ENTRY);
        match tokio::fs::read(&doc).await {
            Ok(bytes) => {
                let metadata = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::aggregate(
                        format!("reading store metadata for '{identity}'"),
                        Error::from(e),
                    )
                })?;
                Ok(Some(metadata))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The root readme of a restored identity, if the package ships one.
    pub async fn readme_path(&self, identity: &PackageIdentity) -> Option<PathBuf> {
        let path = self.package_dir(identity).join(README_ENTRY);
        path.is_file().then_some(path)
    }

    /// The content items compatible with `framework`, chosen by the
    /// longest-compatible rule over the package's `lib/` and `ref/`
    /// framework folders.
    ///
    /// Framework-neutral items (directly under `lib/` or `ref/`) apply
    /// when no framework-specific folder matches. A package with
    /// framework-specific content but no match and no neutral fallback is
    /// `NoCompatibleItems`; a package with no such content at all yields
    /// an empty list.
    pub async fn compatible_items(
        &self,
        identity: &PackageIdentity,
        framework: &Framework,
    ) -> Result<Vec<PathBuf>> {
        let dir = self.package_dir(identity);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut framework_folders: Vec<(Framework, PathBuf)> = Vec::new();
        let mut neutral: Vec<PathBuf> = Vec::new();
        let mut has_framework_content = false;

        for content_root in ["lib", "ref"] {
            let root = dir.join(content_root);
            if !root.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&root)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    has_framework_content = true;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if let Ok(folder_framework) = Framework::parse(&name) {
                        framework_folders.push((folder_framework, path));
                    }
                } else {
                    neutral.push(path);
                }
            }
        }

        if !has_framework_content {
            neutral.sort();
            return Ok(neutral);
        }

        let best = Framework::best_match(framework, framework_folders.iter().map(|(f, _)| f))
            .cloned();
        match best {
            Some(best) => {
                let mut items = Vec::new();
                for (folder_framework, path) in &framework_folders {
                    if *folder_framework == best {
                        collect_files(path, &mut items)?;
                    }
                }
                items.sort();
                Ok(items)
            }
            None if !neutral.is_empty() => {
                neutral.sort();
                Ok(neutral)
            }
            None => Err(Error::NoCompatibleItems {
                identity: identity.to_string(),
                framework: framework.to_string(),
            }),
        }
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageBuilder, PackageMetadata};

    fn ident(id: &str, version: &str) -> PackageIdentity {
        PackageIdentity::new(id, version.parse().unwrap())
    }

    fn fw(s: &str) -> Framework {
        Framework::parse(s).unwrap()
    }

    fn widget_bytes() -> Vec<u8> {
        let meta = PackageMetadata::new("Widget", &"1.0.0".parse().unwrap());
        PackageBuilder::new(meta)
            .file("lib/net40/Widget.dll", b"net40".to_vec())
            .file("lib/net45/Widget.dll", b"net45".to_vec())
            .file("lib/net45/Widget.xml", b"docs".to_vec())
            .file("ReadMe.txt", b"hello".to_vec())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderStore::new(dir.path());
        let identity = ident("Widget", "1.0.0");

        assert!(!store.is_restored(&identity).await);
        let first = store.add_package(&identity, &widget_bytes()).await.unwrap();
        assert!(store.is_restored(&identity).await);
        assert!(first.ends_with("Widget.1.0.0"));

        // Second add is a no-op.
        store.add_package(&identity, &widget_bytes()).await.unwrap();
        assert!(store.is_restored(&identity).await);
    }

    #[tokio::test]
    async fn test_metadata_round_trips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderStore::new(dir.path());
        let identity = ident("Widget", "1.0.0");
        store.add_package(&identity, &widget_bytes()).await.unwrap();

        let metadata = store.read_metadata(&identity).await.unwrap().unwrap();
        assert_eq!(metadata.id, "Widget");
        assert!(store
            .read_metadata(&ident("Ghost", "1.0.0"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_compatible_items_pick_best_framework() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderStore::new(dir.path());
        let identity = ident("Widget", "1.0.0");
        store.add_package(&identity, &widget_bytes()).await.unwrap();

        let items = store.compatible_items(&identity, &fw("net46")).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|p| p.to_string_lossy().contains("net45")));

        let older = store.compatible_items(&identity, &fw("net40")).await.unwrap();
        assert_eq!(older.len(), 1);
        assert!(older[0].to_string_lossy().contains("net40"));
    }

    #[tokio::test]
    async fn test_no_compatible_items_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderStore::new(dir.path());
        let identity = ident("Widget", "1.0.0");
        store.add_package(&identity, &widget_bytes()).await.unwrap();

        let err = store
            .compatible_items(&identity, &fw("net20"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoCompatibleItems { .. }));
    }

    #[tokio::test]
    async fn test_package_without_framework_content_installs_anywhere() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderStore::new(dir.path());
        let identity = ident("Neutral", "1.0.0");
        let bytes = PackageBuilder::new(PackageMetadata::new("Neutral", &"1.0.0".parse().unwrap()))
            .file("content/readme.md", b"no frameworks here".to_vec())
            .build()
            .unwrap();
        store.add_package(&identity, &bytes).await.unwrap();

        let items = store.compatible_items(&identity, &fw("net20")).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_readme_is_found_at_root_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderStore::new(dir.path());
        let identity = ident("Widget", "1.0.0");
        store.add_package(&identity, &widget_bytes()).await.unwrap();

        assert!(store.readme_path(&identity).await.is_some());
        assert!(store.readme_path(&ident("Ghost", "1.0.0")).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_then_restored_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderStore::new(dir.path());
        let identity = ident("Widget", "1.0.0");
        store.add_package(&identity, &widget_bytes()).await.unwrap();
        store.remove_package(&identity).await.unwrap();
        assert!(!store.is_restored(&identity).await);

        // Removing again is harmless.
        store.remove_package(&identity).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_adds_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FolderStore::new(dir.path()));
        let identity = ident("Widget", "1.0.0");
        let bytes = widget_bytes();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let identity = identity.clone();
            let bytes = bytes.clone();
            handles.push(tokio::spawn(async move {
                store.add_package(&identity, &bytes).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(store.is_restored(&identity).await);
    }
}
