// src/resolver/engine.rs

//! Dependency resolver implementation
//!
//! Produces a consistent set of package identities from the installed set,
//! the operation targets, and the resolution policy. Selection is greedy
//! and deterministic: requirement ranges only ever tighten, candidates are
//! consulted in sorted order, and the output is sorted by id.

use crate::error::{Error, Result};
use crate::framework::Framework;
use crate::identity::{id_key, same_id, PackageIdentity};
use crate::project::PackageReference;
use crate::resolver::context::ResolutionContext;
use crate::resolver::graph::DependencyGraph;
use crate::source::{PackageDependency, PackageSource, SourceGateway};
use crate::version::{DependencyBehavior, PackageVersion, VersionRange};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ceiling on worklist steps. Requirement ranges only tighten, so genuine
/// resolutions converge far below this; hitting it means a pathological
/// conflict.
const MAX_STEPS: usize = 10_000;

/// One resolution target.
#[derive(Debug, Clone)]
pub enum ResolveTarget {
    /// A specific identity, e.g. an explicit install or update-to-version.
    Identity(PackageIdentity),
    /// An id to be expanded to its latest permissible version.
    Latest(String),
}

impl ResolveTarget {
    pub fn latest(id: impl Into<String>) -> Self {
        ResolveTarget::Latest(id.into())
    }

    pub fn id(&self) -> &str {
        match self {
            ResolveTarget::Identity(identity) => &identity.id,
            ResolveTarget::Latest(id) => id,
        }
    }
}

/// One entry of a resolution: the chosen identity, its dependency edges
/// under the resolution framework, and the source that knows it.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub identity: PackageIdentity,
    pub dependencies: Vec<PackageDependency>,
    pub source: Option<PackageSource>,
}

/// A consistent resolved set, sorted by id.
#[derive(Debug, Default)]
pub struct Resolution {
    pub packages: Vec<ResolvedPackage>,
}

impl Resolution {
    pub fn get(&self, id: &str) -> Option<&ResolvedPackage> {
        self.packages.iter().find(|p| same_id(&p.identity.id, id))
    }

    pub fn identities(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.packages.iter().map(|p| &p.identity)
    }

    /// The dependency graph over the resolved set.
    pub fn graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for package in &self.packages {
            graph.add_node(package.identity.clone(), package.dependencies.clone());
        }
        graph
    }
}

/// The resolver: stateless over a gateway and a project framework; all
/// per-operation state lives in the walk.
pub struct Resolver<'a> {
    gateway: &'a SourceGateway,
    framework: Framework,
}

impl<'a> Resolver<'a> {
    pub fn new(gateway: &'a SourceGateway, framework: Framework) -> Self {
        Self { gateway, framework }
    }

    /// Resolve `targets` against `installed` under `ctx`.
    ///
    /// The result contains every id that appears in the final project
    /// state: moved and new packages plus the untouched installed set.
    pub async fn resolve(
        &self,
        installed: &[PackageReference],
        targets: &[ResolveTarget],
        ctx: &ResolutionContext,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let mut walk = Walk {
            gateway: self.gateway,
            framework: &self.framework,
            ctx,
            cancel,
            installed: installed
                .iter()
                .map(|r| (id_key(&r.identity.id), r.clone()))
                .collect(),
            chosen: BTreeMap::new(),
            pinned: BTreeSet::new(),
            moved: BTreeSet::new(),
            queue: VecDeque::new(),
        };

        for target in targets {
            walk.seed_target(target).await?;
        }

        if ctx.dependency_behavior == DependencyBehavior::Ignore {
            // Direct targets only: no expansion, no consistency pass. The
            // untouched installed set still rides along so the planner
            // does not mistake it for removals.
            walk.keep_installed_without_edges();
            return Ok(walk.into_resolution());
        }

        let installed_keys: Vec<String> = walk.installed.keys().cloned().collect();
        for key in installed_keys {
            if !walk.chosen.contains_key(&key) {
                walk.choose_installed(&key).await;
            }
        }

        walk.run().await?;
        walk.verify()?;
        Ok(walk.into_resolution())
    }
}

/// Outcome of candidate selection for one id.
enum Selection {
    Chosen(PackageVersion),
    /// The id has no versions in any source at all.
    NoVersions,
    /// Versions exist but none satisfies the intersected requirements.
    NoneInRange {
        requirers: Vec<(PackageIdentity, VersionRange)>,
    },
}

struct Walk<'r> {
    gateway: &'r SourceGateway,
    framework: &'r Framework,
    ctx: &'r ResolutionContext,
    cancel: &'r CancellationToken,
    installed: BTreeMap<String, PackageReference>,
    chosen: BTreeMap<String, ResolvedPackage>,
    /// Ids fixed by an explicit target; never re-picked.
    pinned: BTreeSet<String>,
    /// Ids whose chosen version differs from the installed one (or that
    /// are new). Strictness applies to these; pre-existing breakage among
    /// untouched packages is tolerated.
    moved: BTreeSet<String>,
    queue: VecDeque<String>,
}

impl<'r> Walk<'r> {
    fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    async fn seed_target(&mut self, target: &ResolveTarget) -> Result<()> {
        let identity = match target {
            ResolveTarget::Identity(identity) => identity.clone(),
            ResolveTarget::Latest(id) => {
                let version = self.latest_permissible(id).await?;
                PackageIdentity::new(id.clone(), version)
            }
        };

        let package = self.require_info(&identity).await?;
        let key = id_key(&identity.id);
        let unchanged = self
            .installed
            .get(&key)
            .map(|r| r.identity.version == identity.version)
            .unwrap_or(false);
        if !unchanged {
            self.moved.insert(key.clone());
        }
        self.pinned.insert(key.clone());
        self.chosen.insert(key.clone(), package);
        self.queue.push_back(key);
        Ok(())
    }

    /// Expand an id-only target: the greatest candidate admissible under
    /// the policy. No prerelease fallback.
    async fn latest_permissible(&self, id: &str) -> Result<PackageVersion> {
        let candidates = self.candidates(id).await?;
        candidates
            .into_iter()
            .filter(|v| self.prerelease_admitted(&id_key(id), v))
            .max()
            .ok_or_else(|| Error::NoLatestVersion { id: id.to_string() })
    }

    async fn require_info(&self, identity: &PackageIdentity) -> Result<ResolvedPackage> {
        match self
            .gateway
            .dependency_info(identity, self.framework, &self.ctx.gather_cache, self.cancel)
            .await?
        {
            Some(info) => Ok(ResolvedPackage {
                identity: info.identity,
                dependencies: info.dependencies,
                source: info.source,
            }),
            None => Err(Error::PackageNotFound {
                identity: identity.to_string(),
            }),
        }
    }

    /// Keep an installed package at its current version. Dependency info
    /// is best-effort: a package whose info is gone yields no edges rather
    /// than failing an unrelated operation.
    async fn choose_installed(&mut self, key: &str) {
        let Some(reference) = self.installed.get(key) else {
            return;
        };
        let identity = reference.identity.clone();
        let package = match self
            .gateway
            .dependency_info(&identity, self.framework, &self.ctx.gather_cache, self.cancel)
            .await
        {
            Ok(Some(info)) => ResolvedPackage {
                identity: info.identity,
                dependencies: info.dependencies,
                source: info.source,
            },
            Ok(None) => {
                debug!(identity = %identity, "no dependency info for installed package");
                ResolvedPackage {
                    identity,
                    dependencies: Vec::new(),
                    source: None,
                }
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "gather failed for installed package");
                ResolvedPackage {
                    identity,
                    dependencies: Vec::new(),
                    source: None,
                }
            }
        };
        self.chosen.insert(key.to_string(), package);
        self.queue.push_back(key.to_string());
    }

    fn keep_installed_without_edges(&mut self) {
        let keys: Vec<String> = self.installed.keys().cloned().collect();
        for key in keys {
            if !self.chosen.contains_key(&key) {
                let reference = &self.installed[&key];
                self.chosen.insert(
                    key.clone(),
                    ResolvedPackage {
                        identity: reference.identity.clone(),
                        dependencies: Vec::new(),
                        source: None,
                    },
                );
            }
        }
    }

    /// All versions of `id` admitted by the installed lock and the exact
    /// constraints, sorted ascending. Prerelease admission is decided at
    /// the use sites.
    async fn candidates(&self, id: &str) -> Result<Vec<PackageVersion>> {
        let versions = self
            .gateway
            .list_versions(id, self.ctx.include_unlisted, self.cancel)
            .await?;
        let key = id_key(id);
        let reference = self.installed.get(&key);
        let installed_version = reference.map(|r| r.identity.version.clone());

        Ok(versions
            .into_iter()
            .filter(|v| {
                if let Some(lock) = reference.and_then(|r| r.allowed_versions.as_ref()) {
                    let lock = lock.clone().with_prerelease(self.ctx.include_prerelease);
                    if !lock.satisfies(v) {
                        return false;
                    }
                }
                self.ctx
                    .version_constraints
                    .permits(installed_version.as_ref(), v)
            })
            .collect())
    }

    /// Admission rule for a prerelease version outside a range bound: the
    /// policy admits prereleases, or this is the installed version, or a
    /// pinned target chose it.
    fn prerelease_admitted(&self, key: &str, version: &PackageVersion) -> bool {
        if !version.is_prerelease() || self.ctx.include_prerelease {
            return true;
        }
        if let Some(reference) = self.installed.get(key) {
            if &reference.identity.version == version {
                return true;
            }
        }
        if self.pinned.contains(key) {
            if let Some(chosen) = self.chosen.get(key) {
                if &chosen.identity.version == version {
                    return true;
                }
            }
        }
        false
    }

    fn range_satisfied(&self, key: &str, range: &VersionRange, version: &PackageVersion) -> bool {
        if version.is_prerelease() && self.prerelease_admitted(key, version) {
            range.clone().with_prerelease(true).satisfies(version)
        } else {
            range.satisfies(version)
        }
    }

    /// The intersection of every chosen requirer's range for `dep_key`,
    /// plus the requirer list for diagnostics.
    fn requirement_for(
        &self,
        dep_key: &str,
    ) -> (Option<VersionRange>, Vec<(PackageIdentity, VersionRange)>) {
        let mut requirers = Vec::new();
        let mut intersected: Option<VersionRange> = None;
        let mut disjoint = false;

        for package in self.chosen.values() {
            for dep in &package.dependencies {
                if id_key(&dep.id) != dep_key {
                    continue;
                }
                requirers.push((package.identity.clone(), dep.range.clone()));
                intersected = match intersected.take() {
                    None => Some(dep.range.clone()),
                    Some(current) => match current.intersect(&dep.range) {
                        Some(tighter) => Some(tighter),
                        None => {
                            disjoint = true;
                            None
                        }
                    },
                };
                if disjoint {
                    return (None, requirers);
                }
            }
        }

        (intersected.or_else(|| Some(VersionRange::all())), requirers)
    }

    async fn select_for(&self, dep_key: &str, dep_id: &str) -> Result<Selection> {
        let (intersected, requirers) = self.requirement_for(dep_key);
        let Some(intersected) = intersected else {
            return Ok(Selection::NoneInRange { requirers });
        };

        let candidates = self.candidates(dep_id).await?;
        if candidates.is_empty() {
            let any_at_all = !self
                .gateway
                .list_versions(dep_id, true, self.cancel)
                .await
                .unwrap_or_default()
                .is_empty();
            return Ok(if any_at_all {
                Selection::NoneInRange { requirers }
            } else {
                Selection::NoVersions
            });
        }

        let in_range: Vec<PackageVersion> = candidates
            .into_iter()
            .filter(|v| self.range_satisfied(dep_key, &intersected, v))
            .collect();

        let installed_version = self
            .installed
            .get(dep_key)
            .map(|r| r.identity.version.clone());
        match self
            .ctx
            .dependency_behavior
            .choose(&in_range, installed_version.as_ref())
        {
            Some(version) => Ok(Selection::Chosen(version.clone())),
            None => Ok(Selection::NoneInRange { requirers }),
        }
    }

    async fn set_chosen(&mut self, id: &str, version: PackageVersion) -> Result<()> {
        let identity = PackageIdentity::new(id, version);
        let package = self.require_info(&identity).await?;
        let key = id_key(id);

        let unchanged = self
            .installed
            .get(&key)
            .map(|r| r.identity.version == identity.version)
            .unwrap_or(false);
        if unchanged {
            self.moved.remove(&key);
        } else {
            self.moved.insert(key.clone());
        }

        debug!(identity = %package.identity, "resolver chose");
        self.chosen.insert(key.clone(), package);
        self.queue.push_back(key);
        Ok(())
    }

    /// An untouched installed package tolerates unresolvable edges; a
    /// target or moved package does not.
    fn is_lenient(&self, key: &str) -> bool {
        self.installed.contains_key(key)
            && !self.moved.contains(key)
            && !self.pinned.contains(key)
    }

    /// Drain the worklist: process every chosen package's edges, choosing,
    /// re-picking, or repairing until nothing changes.
    async fn run(&mut self) -> Result<()> {
        let mut steps = 0usize;

        while let Some(key) = self.queue.pop_front() {
            self.ensure_active()?;
            steps += 1;
            if steps > MAX_STEPS {
                return Err(Error::DependencyConflict {
                    id: key,
                    detail: "resolution did not converge".to_string(),
                });
            }

            let Some(node) = self.chosen.get(&key).cloned() else {
                continue;
            };

            for dep in &node.dependencies {
                let dep_key = id_key(&dep.id);
                let existing = self
                    .chosen
                    .get(&dep_key)
                    .map(|p| p.identity.version.clone());

                match existing {
                    Some(existing) => {
                        if self.range_satisfied(&dep_key, &dep.range, &existing) {
                            continue;
                        }
                        self.handle_violation(&key, &node.identity, dep, &existing)
                            .await?;
                    }
                    None => {
                        // Prefer the installed version when it satisfies.
                        if let Some(reference) = self.installed.get(&dep_key) {
                            let installed_version = reference.identity.version.clone();
                            if self.range_satisfied(&dep_key, &dep.range, &installed_version) {
                                self.choose_installed(&dep_key).await;
                                continue;
                            }
                        }

                        match self.select_for(&dep_key, &dep.id).await? {
                            Selection::Chosen(version) => {
                                self.set_chosen(&dep.id, version).await?;
                            }
                            Selection::NoVersions => {
                                if self.is_lenient(&key) {
                                    warn!(
                                        requirer = %node.identity,
                                        dependency = %dep.id,
                                        "installed package depends on an id no source knows; leaving as-is"
                                    );
                                    continue;
                                }
                                return Err(Error::PackageNotFound {
                                    identity: dep.id.clone(),
                                });
                            }
                            Selection::NoneInRange { .. } => {
                                if self.is_lenient(&key) {
                                    warn!(
                                        requirer = %node.identity,
                                        dependency = %dep.id,
                                        "installed package has an unsatisfiable edge; leaving as-is"
                                    );
                                    continue;
                                }
                                return Err(self.conflict(
                                    &dep.id,
                                    &node.identity,
                                    &dep.range,
                                    None,
                                ));
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// A chosen dependency violates this requirer's range. Either the
    /// dependency moves (when it is not pinned and another candidate fits
    /// every requirement), or the requirer is upgraded per the
    /// parent-update rule, or the resolution fails naming both sides.
    async fn handle_violation(
        &mut self,
        requirer_key: &str,
        requirer: &PackageIdentity,
        dep: &PackageDependency,
        existing: &PackageVersion,
    ) -> Result<()> {
        let dep_key = id_key(&dep.id);

        if !self.pinned.contains(&dep_key) {
            if let Selection::Chosen(version) = self.select_for(&dep_key, &dep.id).await? {
                if version != *existing {
                    self.set_chosen(&dep.id, version).await?;
                    return Ok(());
                }
            }
        }

        // The dependency cannot move; try moving the requirer instead.
        if !self.pinned.contains(requirer_key)
            && self.installed.contains_key(requirer_key)
            && self.repair_parent(requirer_key, &dep_key, &dep.id).await?
        {
            return Ok(());
        }

        Err(self.conflict(&dep.id, requirer, &dep.range, Some(existing)))
    }

    /// Parent-update rule: the chosen dependency broke `parent`'s range,
    /// so move the parent to its lowest available version whose range
    /// admits the chosen dependency. Returns false when no version of the
    /// parent does.
    async fn repair_parent(&mut self, parent_key: &str, dep_key: &str, dep_id: &str) -> Result<bool> {
        let Some(parent_ref) = self.installed.get(parent_key) else {
            return Ok(false);
        };
        let parent_id = parent_ref.identity.id.clone();
        let current = self
            .chosen
            .get(parent_key)
            .map(|p| p.identity.version.clone());
        let chosen_dep = match self.chosen.get(dep_key) {
            Some(package) => package.identity.version.clone(),
            None => return Ok(false),
        };

        for version in self.candidates(&parent_id).await? {
            if Some(&version) == current.as_ref() {
                continue;
            }
            if !self.prerelease_admitted(parent_key, &version) {
                continue;
            }
            let candidate = PackageIdentity::new(parent_id.clone(), version);
            let info = self
                .gateway
                .dependency_info(&candidate, self.framework, &self.ctx.gather_cache, self.cancel)
                .await?;
            let Some(info) = info else {
                continue;
            };
            let admits = info
                .dependencies
                .iter()
                .find(|d| id_key(&d.id) == dep_key)
                .map(|d| self.range_satisfied(dep_key, &d.range, &chosen_dep))
                .unwrap_or(true);
            if admits {
                debug!(
                    parent = %candidate,
                    dependency = %format!("{dep_id}/{chosen_dep}"),
                    "upgrading parent to admit moved dependency"
                );
                self.moved.insert(parent_key.to_string());
                self.chosen.insert(
                    parent_key.to_string(),
                    ResolvedPackage {
                        identity: info.identity,
                        dependencies: info.dependencies,
                        source: info.source,
                    },
                );
                self.queue.push_back(parent_key.to_string());
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn conflict(
        &self,
        dep_id: &str,
        requirer: &PackageIdentity,
        range: &VersionRange,
        chosen: Option<&PackageVersion>,
    ) -> Error {
        let dep_key = id_key(dep_id);
        let (_, requirers) = self.requirement_for(&dep_key);
        let mut detail = match chosen {
            Some(version) => format!(
                "'{requirer}' requires {dep_id} {range} but {version} was selected"
            ),
            None => format!("'{requirer}' requires {dep_id} {range} but no version satisfies it"),
        };
        let others: Vec<String> = requirers
            .iter()
            .filter(|(who, _)| who != requirer)
            .map(|(who, r)| format!("'{who}' requires {r}"))
            .collect();
        if !others.is_empty() {
            detail.push_str(&format!(" (also: {})", others.join(", ")));
        }
        Error::DependencyConflict {
            id: dep_id.to_string(),
            detail,
        }
    }

    /// Final pass: every chosen edge must hold, and no cycle may involve a
    /// package this resolution touched.
    fn verify(&self) -> Result<()> {
        for (key, package) in &self.chosen {
            for dep in &package.dependencies {
                let dep_key = id_key(&dep.id);
                let Some(target) = self.chosen.get(&dep_key) else {
                    continue;
                };
                if self.range_satisfied(&dep_key, &dep.range, &target.identity.version) {
                    continue;
                }
                let strict = !self.is_lenient(key) || !self.is_lenient(&dep_key);
                if strict {
                    return Err(self.conflict(
                        &dep.id,
                        &package.identity,
                        &dep.range,
                        Some(&target.identity.version),
                    ));
                }
                warn!(
                    requirer = %package.identity,
                    dependency = %target.identity,
                    range = %dep.range,
                    "tolerating pre-existing constraint violation"
                );
            }
        }

        let mut graph = DependencyGraph::new();
        for package in self.chosen.values() {
            graph.add_node(package.identity.clone(), package.dependencies.clone());
        }
        if let Some(cycle) = graph.find_cycle() {
            let touched = cycle.iter().any(|identity| {
                let key = id_key(&identity.id);
                self.moved.contains(&key) || self.pinned.contains(&key)
            });
            if touched {
                let rendered: Vec<String> = cycle.iter().map(|i| i.to_string()).collect();
                return Err(Error::DependencyConflict {
                    id: cycle
                        .first()
                        .map(|i| i.id.clone())
                        .unwrap_or_else(|| "<unknown>".to_string()),
                    detail: format!("dependency cycle: {}", rendered.join(" -> ")),
                });
            }
            warn!("tolerating pre-existing dependency cycle among untouched packages");
        }

        Ok(())
    }

    fn into_resolution(self) -> Resolution {
        Resolution {
            packages: self.chosen.into_values().collect(),
        }
    }
}
