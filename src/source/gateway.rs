// src/source/gateway.rs

//! Multi-source composition with failover.
//!
//! Version listings union across sources; dependency info and package
//! fetches probe sources in declared order and take the first hit. A
//! failing source is logged and skipped; only when every source fails does
//! the error surface.

use crate::error::{Error, Result};
use crate::framework::Framework;
use crate::identity::PackageIdentity;
use crate::source::{GatherCache, GatherKey, PackageSource, ResolvedDependencyInfo, Source};
use crate::version::PackageVersion;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ordered composition of package sources.
pub struct SourceGateway {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceGateway {
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    /// Union of versions across all sources, deduplicated and sorted
    /// ascending. Individual source failures are recoverable; if every
    /// source fails the last error surfaces.
    pub async fn list_versions(
        &self,
        id: &str,
        include_unlisted: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageVersion>> {
        let mut versions: Vec<PackageVersion> = Vec::new();
        let mut failures = 0usize;
        let mut last_error = None;

        for source in &self.sources {
            ensure_active(cancel)?;
            match source.list_versions(id, include_unlisted).await {
                Ok(found) => {
                    for v in found {
                        if !versions.contains(&v) {
                            versions.push(v);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        source = %source.package_source(),
                        id,
                        error = %e,
                        "source failed to list versions"
                    );
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == self.sources.len() {
            if let Some(e) = last_error {
                return Err(Error::SourceUnavailable {
                    detail: format!("listing versions of '{id}': {e}"),
                });
            }
        }

        versions.sort();
        Ok(versions)
    }

    /// Probe sources in declared order for dependency info, first hit wins.
    /// Results flow through the gather cache keyed per source.
    pub async fn dependency_info(
        &self,
        identity: &PackageIdentity,
        framework: &Framework,
        cache: &GatherCache,
        cancel: &CancellationToken,
    ) -> Result<Option<ResolvedDependencyInfo>> {
        let mut failures = 0usize;
        let mut last_error = None;

        for source in &self.sources {
            ensure_active(cancel)?;
            let package_source = source.package_source().clone();
            let key = GatherKey {
                source_url: package_source.url.clone(),
                identity: identity.clone(),
                framework: framework.clone(),
            };
            let fetched = cache
                .get_or_fetch(key, || {
                    let source = Arc::clone(source);
                    let identity = identity.clone();
                    let framework = framework.clone();
                    async move { source.dependency_info(&identity, &framework).await }
                })
                .await;

            match fetched {
                Ok(Some(mut info)) => {
                    debug!(identity = %identity, source = %package_source, "dependency info found");
                    info.source = Some(package_source);
                    return Ok(Some(info));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        source = %package_source,
                        identity = %identity,
                        error = %e,
                        "source failed to provide dependency info"
                    );
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if !self.sources.is_empty() && failures == self.sources.len() {
            if let Some(e) = last_error {
                return Err(Error::SourceUnavailable {
                    detail: format!("gathering dependency info for '{identity}': {e}"),
                });
            }
        }

        Ok(None)
    }

    /// Fetch package bytes with failover, attributing the winning source.
    pub async fn fetch_package(
        &self,
        identity: &PackageIdentity,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, PackageSource)> {
        let mut failures = 0usize;
        let mut last_error = None;

        for source in &self.sources {
            ensure_active(cancel)?;
            match source.fetch_package(identity).await {
                Ok(bytes) => {
                    debug!(identity = %identity, source = %source.package_source(), "fetched package");
                    return Ok((bytes, source.package_source().clone()));
                }
                Err(e) => {
                    if !matches!(e, Error::PackageNotFound { .. }) {
                        warn!(
                            source = %source.package_source(),
                            identity = %identity,
                            error = %e,
                            "source failed to fetch package"
                        );
                        failures += 1;
                    }
                    last_error = Some(e);
                }
            }
        }

        if !self.sources.is_empty() && failures == self.sources.len() {
            // Every source hard-failed; the identity may well exist.
            if let Some(e) = last_error {
                return Err(Error::SourceUnavailable {
                    detail: format!("fetching '{identity}': {e}"),
                });
            }
        }

        Err(Error::PackageNotFound {
            identity: identity.to_string(),
        })
    }

    /// The greatest version of `id` across sources that passes the
    /// prerelease/unlisted policy, or `None`. No prerelease fallback: when
    /// the policy forbids prereleases and only prereleases exist, this is
    /// `None`.
    pub async fn latest_version(
        &self,
        id: &str,
        include_prerelease: bool,
        include_unlisted: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<PackageVersion>> {
        let versions = self.list_versions(id, include_unlisted, cancel).await?;
        Ok(versions
            .into_iter()
            .filter(|v| include_prerelease || !v.is_prerelease())
            .max())
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageBuilder, PackageMetadata};
    use crate::source::InMemorySource;
    use async_trait::async_trait;

    struct FailingSource {
        source: PackageSource,
    }

    #[async_trait]
    impl Source for FailingSource {
        fn package_source(&self) -> &PackageSource {
            &self.source
        }

        async fn list_versions(&self, _id: &str, _include_unlisted: bool) -> Result<Vec<PackageVersion>> {
            Err(Error::SourceUnavailable {
                detail: "feed offline".to_string(),
            })
        }

        async fn dependency_info(
            &self,
            _identity: &PackageIdentity,
            _framework: &Framework,
        ) -> Result<Option<ResolvedDependencyInfo>> {
            Err(Error::SourceUnavailable {
                detail: "feed offline".to_string(),
            })
        }

        async fn fetch_package(&self, _identity: &PackageIdentity) -> Result<Vec<u8>> {
            Err(Error::SourceUnavailable {
                detail: "feed offline".to_string(),
            })
        }
    }

    fn memory_source(name: &str, packages: &[(&str, &str)]) -> Arc<dyn Source> {
        let mut source = InMemorySource::new(name, format!("https://{name}.example/v3"));
        for (id, version) in packages {
            let meta = PackageMetadata::new(*id, &version.parse().unwrap());
            source
                .add_package_bytes(PackageBuilder::new(meta).build().unwrap())
                .unwrap();
        }
        Arc::new(source)
    }

    fn ident(id: &str, version: &str) -> PackageIdentity {
        PackageIdentity::new(id, version.parse().unwrap())
    }

    #[tokio::test]
    async fn test_list_versions_unions_and_dedupes() {
        let gateway = SourceGateway::new(vec![
            memory_source("alpha", &[("jQuery", "1.4.4"), ("jQuery", "1.6.4")]),
            memory_source("beta", &[("jQuery", "1.6.4"), ("jQuery", "2.0.0")]),
        ]);

        let versions = gateway
            .list_versions("jquery", false, &CancellationToken::new())
            .await
            .unwrap();
        let rendered: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(rendered, vec!["1.4.4", "1.6.4", "2.0.0"]);
    }

    #[tokio::test]
    async fn test_one_failing_source_is_recoverable() {
        let failing: Arc<dyn Source> = Arc::new(FailingSource {
            source: PackageSource::new("down", "https://down.example/v3"),
        });
        let gateway = SourceGateway::new(vec![failing, memory_source("up", &[("a", "1.0.0")])]);

        let versions = gateway
            .list_versions("a", false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn test_all_sources_failing_bubbles() {
        let gateway = SourceGateway::new(vec![Arc::new(FailingSource {
            source: PackageSource::new("down", "https://down.example/v3"),
        }) as Arc<dyn Source>]);

        let err = gateway
            .list_versions("a", false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_dependency_info_first_hit_wins_and_attributes() {
        let gateway = SourceGateway::new(vec![
            memory_source("alpha", &[("a", "1.0.0")]),
            memory_source("beta", &[("a", "1.0.0")]),
        ]);
        let cache = GatherCache::new();

        let info = gateway
            .dependency_info(
                &ident("a", "1.0.0"),
                &Framework::Any,
                &cache,
                &CancellationToken::new(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.source.unwrap().url, "https://alpha.example/v3");
    }

    #[tokio::test]
    async fn test_latest_version_respects_prerelease_policy() {
        let gateway = SourceGateway::new(vec![memory_source("alpha", &[("a", "2.0.0-beta.1")])]);
        let cancel = CancellationToken::new();

        let stable = gateway.latest_version("a", false, false, &cancel).await.unwrap();
        assert!(stable.is_none());

        let pre = gateway.latest_version("a", true, false, &cancel).await.unwrap();
        assert_eq!(pre.unwrap().to_string(), "2.0.0-beta.1");
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits() {
        let gateway = SourceGateway::new(vec![memory_source("alpha", &[("a", "1.0.0")])]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = gateway.list_versions("a", false, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_fetch_package_not_found() {
        let gateway = SourceGateway::new(vec![memory_source("alpha", &[("a", "1.0.0")])]);
        let err = gateway
            .fetch_package(&ident("missing", "1.0.0"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { .. }));
    }
}
