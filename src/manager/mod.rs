// src/manager/mod.rs

//! The package manager façade
//!
//! Thin composition over resolver, planner, and applier: previews produce
//! action plans without touching anything; execute applies a plan to one
//! project; plus dependency-order enumeration and single-package restore.

use crate::error::{Error, Result};
use crate::identity::{same_id, PackageIdentity};
use crate::project::{
    Applier, PackageReference, Project, ProjectContext, UninstallationContext,
};
use crate::resolver::{
    DependencyGraph, Resolution, ResolvedPackage, Resolver, ResolveTarget, ResolutionContext,
};
use crate::solution::SolutionManager;
use crate::source::{dependencies_for, SourceGateway};
use crate::transaction::{ActionPlan, ActionPlanner};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct PackageManager {
    gateway: SourceGateway,
    solution: SolutionManager,
}

impl PackageManager {
    pub fn new(gateway: SourceGateway, solution: SolutionManager) -> Self {
        Self { gateway, solution }
    }

    pub fn gateway(&self) -> &SourceGateway {
        &self.gateway
    }

    pub fn solution(&self) -> &SolutionManager {
        &self.solution
    }

    /// Plan the install of a specific identity.
    pub async fn preview_install(
        &self,
        project: &Project,
        identity: &PackageIdentity,
        ctx: &ResolutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActionPlan> {
        let installed = project.installed_packages().await?;
        if installed.iter().any(|r| r.identity == *identity) {
            return Err(Error::PackageAlreadyInstalled {
                identity: identity.to_string(),
                project: project.name().to_string(),
            });
        }

        let resolution = self
            .resolve(project, &installed, &[ResolveTarget::Identity(identity.clone())], ctx, cancel)
            .await?;
        ActionPlanner::plan_changes(&installed, &resolution, false)
    }

    /// Plan the install of an id at its latest permissible version.
    ///
    /// Installing the version already present fails, and so does a latest
    /// version below the installed one; an explicit identity install is
    /// the way to downgrade on purpose.
    pub async fn preview_install_latest(
        &self,
        project: &Project,
        id: &str,
        ctx: &ResolutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActionPlan> {
        let installed = project.installed_packages().await?;
        let latest = self
            .gateway
            .latest_version(id, ctx.include_prerelease, ctx.include_unlisted, cancel)
            .await?
            .ok_or_else(|| Error::NoLatestVersion { id: id.to_string() })?;

        if let Some(current) = installed.iter().find(|r| same_id(&r.identity.id, id)) {
            match latest.cmp(&current.identity.version) {
                std::cmp::Ordering::Equal => {
                    return Err(Error::PackageAlreadyInstalled {
                        identity: current.identity.to_string(),
                        project: project.name().to_string(),
                    });
                }
                std::cmp::Ordering::Less => {
                    return Err(Error::UnexpectedDowngrade {
                        id: id.to_string(),
                        installed: current.identity.version.to_string(),
                        proposed: latest.to_string(),
                    });
                }
                std::cmp::Ordering::Greater => {}
            }
        }

        self.preview_install(project, &PackageIdentity::new(id, latest), ctx, cancel)
            .await
    }

    /// Plan an update.
    ///
    /// No targets updates every installed id to its latest permissible
    /// version; id-only targets update those ids; identity targets pin
    /// exact versions (downgrades allowed); a context with every exact
    /// constraint bit set plans the reinstall pairs instead.
    pub async fn preview_update(
        &self,
        project: &Project,
        targets: &[ResolveTarget],
        ctx: &ResolutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActionPlan> {
        let installed = project.installed_packages().await?;

        if ctx.is_reinstall() {
            let local = self.local_packages(project, &installed).await?;
            return ActionPlanner::plan_reinstall(&installed, &local);
        }

        let resolve_targets: Vec<ResolveTarget> = if targets.is_empty() {
            let mut all = Vec::new();
            for reference in &installed {
                let id = &reference.identity.id;
                let known = !self
                    .gateway
                    .list_versions(id, ctx.include_unlisted, cancel)
                    .await?
                    .is_empty();
                if known {
                    all.push(ResolveTarget::latest(id.clone()));
                } else {
                    warn!(id, "skipping update of a package no source knows");
                }
            }
            all
        } else {
            targets.to_vec()
        };

        let resolution = self
            .resolve(project, &installed, &resolve_targets, ctx, cancel)
            .await?;
        ActionPlanner::plan_changes(&installed, &resolution, false)
    }

    /// Plan the uninstall of an id, enforcing the dependent guard. The
    /// dependency edges come from the local store, so this works offline.
    pub async fn preview_uninstall(
        &self,
        project: &Project,
        id: &str,
        options: &UninstallationContext,
    ) -> Result<ActionPlan> {
        let installed = project.installed_packages().await?;
        let local = self.local_packages(project, &installed).await?;
        ActionPlanner::plan_uninstall(&installed, &local, id, options)
    }

    /// Apply a previously produced plan to the project.
    pub async fn execute(
        &self,
        project: &Project,
        plan: &ActionPlan,
        ctx: &ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(project = project.name(), summary = ?plan.summary(), "executing plan");
        Applier::new(&self.gateway, &self.solution)
            .execute(project, plan, ctx, cancel)
            .await
    }

    /// Preview-and-execute convenience for installs.
    pub async fn install(
        &self,
        project: &Project,
        identity: &PackageIdentity,
        ctx: &ResolutionContext,
        project_ctx: &ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let plan = self.preview_install(project, identity, ctx, cancel).await?;
        self.execute(project, &plan, project_ctx, cancel).await
    }

    /// Preview-and-execute convenience for updates.
    pub async fn update(
        &self,
        project: &Project,
        targets: &[ResolveTarget],
        ctx: &ResolutionContext,
        project_ctx: &ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let plan = self.preview_update(project, targets, ctx, cancel).await?;
        self.execute(project, &plan, project_ctx, cancel).await
    }

    /// Preview-and-execute convenience for uninstalls. The guard is the
    /// same one the preview enforces.
    pub async fn uninstall(
        &self,
        project: &Project,
        id: &str,
        options: &UninstallationContext,
        project_ctx: &ProjectContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let plan = self.preview_uninstall(project, id, options).await?;
        self.execute(project, &plan, project_ctx, cancel).await
    }

    /// Manifest entries sorted dependencies-first using store metadata.
    /// Any unrestored entry makes the whole enumeration empty.
    pub async fn installed_in_dependency_order(
        &self,
        project: &Project,
    ) -> Result<Vec<PackageReference>> {
        let installed = project.installed_packages().await?;
        if installed.is_empty() {
            return Ok(Vec::new());
        }

        let mut graph = DependencyGraph::new();
        for reference in &installed {
            let Some(metadata) = self
                .solution
                .store()
                .read_metadata(&reference.identity)
                .await?
            else {
                debug!(identity = %reference.identity, "unrestored entry, dependency order unavailable");
                return Ok(Vec::new());
            };
            let groups = metadata.typed_groups()?;
            graph.add_node(
                reference.identity.clone(),
                dependencies_for(&groups, project.target_framework()),
            );
        }

        let order = graph.dependency_order()?;
        let mut sorted = Vec::with_capacity(installed.len());
        for identity in order {
            if let Some(reference) = installed
                .iter()
                .find(|r| same_id(&r.identity.id, &identity.id))
            {
                sorted.push(reference.clone());
            }
        }
        Ok(sorted)
    }

    /// Materialize one identity into the store without touching any
    /// manifest. A no-op when the content is already present.
    pub async fn restore_package(
        &self,
        identity: &PackageIdentity,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let store = self.solution.store();
        if store.is_restored(identity).await {
            debug!(identity = %identity, "already restored");
            return Ok(());
        }
        let (bytes, source) = self.gateway.fetch_package(identity, cancel).await?;
        store.add_package(identity, &bytes).await?;
        info!(identity = %identity, source = %source, "restored");
        Ok(())
    }

    async fn resolve(
        &self,
        project: &Project,
        installed: &[PackageReference],
        targets: &[ResolveTarget],
        ctx: &ResolutionContext,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        Resolver::new(&self.gateway, project.target_framework().clone())
            .resolve(installed, targets, ctx, cancel)
            .await
    }

    /// The installed set with dependency edges read from the store;
    /// unrestored entries contribute no edges.
    async fn local_packages(
        &self,
        project: &Project,
        installed: &[PackageReference],
    ) -> Result<Vec<ResolvedPackage>> {
        let mut local = Vec::with_capacity(installed.len());
        for reference in installed {
            let dependencies = match self
                .solution
                .store()
                .read_metadata(&reference.identity)
                .await?
            {
                Some(metadata) => {
                    dependencies_for(&metadata.typed_groups()?, project.target_framework())
                }
                None => Vec::new(),
            };
            local.push(ResolvedPackage {
                identity: reference.identity.clone(),
                dependencies,
                source: None,
            });
        }
        Ok(local)
    }
}
