// src/project/applier.rs

//! Applies an action plan to one project.
//!
//! Actions run in list order, each atomic from the manifest's point of
//! view: the manifest is replaced after the store and the project system
//! reflect the action, so readers see pre- or post-state only. A failing
//! action aborts the remainder with the original cause preserved.

use crate::error::{Error, Result};
use crate::identity::{same_id, PackageIdentity};
use crate::package::{self, PackageMetadata};
use crate::project::{PackageReference, Project, ProjectContext};
use crate::solution::SolutionManager;
use crate::source::{PackageSource, SourceGateway};
use crate::transaction::{ActionPlan, ProjectAction};
use crate::version::PackageVersion;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The version gate packages test with `min_client_version`.
pub fn client_version() -> PackageVersion {
    PackageVersion::new(3, 5, 0)
}

/// Package types this implementation understands. Anything else fails the
/// install before any mutation.
const KNOWN_PACKAGE_TYPES: &[&str] = &["dependency", "legacy"];

pub struct Applier<'a> {
    gateway: &'a SourceGateway,
    solution: &'a SolutionManager,
}

impl<'a> Applier<'a> {
    pub fn new(gateway: &'a SourceGateway, solution: &'a SolutionManager) -> Self {
        Self { gateway, solution }
    }

    /// Apply every action in order. Cancellation between actions leaves
    /// the project consistent up to the last completed action.
    pub async fn execute(
        &self,
        project: &Project,
        plan: &ActionPlan,
        ctx: &ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _guard = project.apply_guard().await;
        let mut installed_any = false;
        // Entries removed earlier in this plan, kept so an install of the
        // same id (a logical update) can restore every attribute the
        // applier does not own.
        let mut removed_entries: std::collections::HashMap<String, PackageReference> =
            std::collections::HashMap::new();

        for action in &plan.actions {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let applied = match action {
                ProjectAction::Uninstall { identity } => {
                    self.uninstall(project, identity, &mut removed_entries, cancel)
                        .await
                }
                ProjectAction::Install { identity, source } => {
                    self.install(project, identity, source.as_ref(), &removed_entries, ctx, cancel)
                        .await
                }
            };
            if let Err(e) = applied {
                return Err(Error::aggregate(
                    format!("failed to {action} in project '{}'", project.name()),
                    e,
                ));
            }
            installed_any = installed_any || action.is_install();
        }

        if installed_any && !ctx.binding_redirects_disabled {
            project.system().write_binding_redirects().await?;
        }

        Ok(())
    }

    async fn uninstall(
        &self,
        project: &Project,
        identity: &PackageIdentity,
        removed_entries: &mut std::collections::HashMap<String, PackageReference>,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        let mut references = project.manifest().read().await?;
        let Some(position) = references
            .iter()
            .position(|r| same_id(&r.identity.id, &identity.id))
        else {
            warn!(identity = %identity, project = project.name(), "not in manifest, nothing to uninstall");
            return Ok(());
        };

        let store = self.solution.store();
        if store.is_restored(identity).await {
            let items = match store
                .compatible_items(identity, project.target_framework())
                .await
            {
                Ok(items) => items,
                // Content that never matched this framework has nothing to
                // remove from the project system.
                Err(Error::NoCompatibleItems { .. }) => Vec::new(),
                Err(e) => return Err(e),
            };
            project.system().remove_references(identity, &items).await?;
        } else {
            debug!(identity = %identity, "unrestored package, skipping reference removal");
        }

        let removed = references.remove(position);
        project.manifest().write(&references).await?;
        removed_entries.insert(crate::identity::id_key(&identity.id), removed);

        if !self
            .solution
            .referenced_elsewhere(identity, project.name())
            .await?
        {
            store.remove_package(identity).await?;
        } else {
            debug!(identity = %identity, "store content still referenced by another project");
        }

        info!(identity = %identity, project = project.name(), "uninstalled");
        Ok(())
    }

    async fn install(
        &self,
        project: &Project,
        identity: &PackageIdentity,
        _source: Option<&PackageSource>,
        removed_entries: &std::collections::HashMap<String, PackageReference>,
        ctx: &ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (bytes, origin) = self.gateway.fetch_package(identity, cancel).await?;
        let metadata = package::read_metadata(&bytes)
            .map_err(|e| Error::aggregate(format!("reading package '{identity}'"), e))?;

        // Gates run before any mutation for this action.
        check_client_gates(identity, &metadata)?;

        let store = self.solution.store();
        store.add_package(identity, &bytes).await?;
        let items = store
            .compatible_items(identity, project.target_framework())
            .await?;
        project.system().add_references(identity, &items).await?;

        let mut references = project.manifest().read().await?;
        match references
            .iter()
            .position(|r| same_id(&r.identity.id, &identity.id))
        {
            Some(position) => {
                // Replace in place: every attribute the applier does not
                // own stays as the user wrote it.
                references[position] = references[position]
                    .with_version(identity.version.clone(), project.target_framework());
            }
            None => {
                // An update runs as uninstall-then-install of one id; the
                // removed entry's attributes carry over to the new one.
                let reference = match removed_entries.get(&crate::identity::id_key(&identity.id)) {
                    Some(previous) => {
                        previous.with_version(identity.version.clone(), project.target_framework())
                    }
                    None => {
                        let mut fresh = PackageReference::new(
                            identity.clone(),
                            Some(project.target_framework().clone()),
                        );
                        if metadata.development_dependency {
                            fresh = fresh.with_development_dependency(true);
                        }
                        fresh
                    }
                };
                references.push(reference);
            }
        }
        project.manifest().write(&references).await?;

        if let Some(execution) = &ctx.execution_context {
            if execution.is_direct(identity) {
                if let Some(readme) = store.readme_path(identity).await {
                    execution.record_opened(readme);
                }
            }
        }

        info!(identity = %identity, project = project.name(), source = %origin, "installed");
        Ok(())
    }
}

fn check_client_gates(identity: &PackageIdentity, metadata: &PackageMetadata) -> Result<()> {
    if let Some(min) = metadata.min_client_version()? {
        let current = client_version();
        if min > current {
            return Err(Error::VersionNotSatisfied {
                identity: identity.to_string(),
                reason: format!("declares minClientVersion {min}, this client is {current}"),
            });
        }
    }
    for package_type in &metadata.package_types {
        if !KNOWN_PACKAGE_TYPES
            .iter()
            .any(|known| package_type.eq_ignore_ascii_case(known))
        {
            return Err(Error::VersionNotSatisfied {
                identity: identity.to_string(),
                reason: format!("declares unsupported package type '{package_type}'"),
            });
        }
    }
    Ok(())
}
