// src/transaction/planner.rs

//! Plans project changes before anything is touched.
//!
//! The planner diffs a resolved set against the installed set, orders the
//! resulting actions over the dependency DAG restricted to the affected
//! ids, and enforces the dependent guard on uninstalls.

use crate::error::{Error, Result};
use crate::identity::id_key;
use crate::project::{PackageReference, UninstallationContext};
use crate::resolver::{DependencyGraph, Resolution, ResolvedPackage};
use crate::transaction::{ActionPlan, ProjectAction};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

pub struct ActionPlanner;

impl ActionPlanner {
    /// Diff `resolution` against `installed` into an ordered plan.
    ///
    /// Ids present on one side only become a single action; ids whose
    /// version changed become an uninstall of the old identity plus an
    /// install of the new one. Identical versions produce nothing unless
    /// `force_reinstall` asks for the uninstall+install pair.
    pub fn plan_changes(
        installed: &[PackageReference],
        resolution: &Resolution,
        force_reinstall: bool,
    ) -> Result<ActionPlan> {
        let installed_map: BTreeMap<String, &PackageReference> = installed
            .iter()
            .map(|r| (id_key(&r.identity.id), r))
            .collect();
        let resolved_map: BTreeMap<String, &ResolvedPackage> = resolution
            .packages
            .iter()
            .map(|p| (id_key(&p.identity.id), p))
            .collect();

        let mut uninstall_keys: BTreeSet<String> = BTreeSet::new();
        let mut install_keys: BTreeSet<String> = BTreeSet::new();

        for (key, reference) in &installed_map {
            match resolved_map.get(key) {
                None => {
                    uninstall_keys.insert(key.clone());
                }
                Some(resolved) => {
                    if force_reinstall
                        || resolved.identity.version != reference.identity.version
                    {
                        uninstall_keys.insert(key.clone());
                        install_keys.insert(key.clone());
                    }
                }
            }
        }
        for key in resolved_map.keys() {
            if !installed_map.contains_key(key) {
                install_keys.insert(key.clone());
            }
        }

        // Order over the DAG restricted to the affected ids; pre-existing
        // cycles among untouched packages never enter the picture.
        let affected: BTreeSet<String> = uninstall_keys
            .union(&install_keys)
            .cloned()
            .collect();
        let mut graph = DependencyGraph::new();
        for key in &affected {
            let (identity, dependencies) = match resolved_map.get(key) {
                Some(resolved) => (resolved.identity.clone(), resolved.dependencies.clone()),
                None => (installed_map[key].identity.clone(), Vec::new()),
            };
            graph.add_node(identity, dependencies);
        }

        let mut actions = Vec::new();
        for identity in graph.dependent_order()? {
            let key = id_key(&identity.id);
            if uninstall_keys.contains(&key) {
                actions.push(ProjectAction::Uninstall {
                    identity: installed_map[&key].identity.clone(),
                });
            }
        }
        for identity in graph.dependency_order()? {
            let key = id_key(&identity.id);
            if install_keys.contains(&key) {
                let resolved = resolved_map[&key];
                actions.push(ProjectAction::Install {
                    identity: resolved.identity.clone(),
                    source: resolved.source.clone(),
                });
            }
        }

        let plan = ActionPlan::new(actions);
        debug!(summary = ?plan.summary(), "planned project changes");
        Ok(plan)
    }

    /// Reinstall: an uninstall+install pair for every installed package at
    /// its current version, ordered like any other plan. `local` supplies
    /// the dependency edges (typically read from the store).
    pub fn plan_reinstall(
        installed: &[PackageReference],
        local: &[ResolvedPackage],
    ) -> Result<ActionPlan> {
        let resolution = Resolution {
            packages: local.to_vec(),
        };
        Self::plan_changes(installed, &resolution, true)
    }

    /// Plan the uninstall of `id`, honoring the dependent guard and the
    /// `remove_dependencies`/`force_remove` options.
    pub fn plan_uninstall(
        installed: &[PackageReference],
        local: &[ResolvedPackage],
        id: &str,
        options: &UninstallationContext,
    ) -> Result<ActionPlan> {
        let target_key = id_key(id);
        let installed_map: BTreeMap<String, &PackageReference> = installed
            .iter()
            .map(|r| (id_key(&r.identity.id), r))
            .collect();
        let Some(target) = installed_map.get(&target_key) else {
            return Err(Error::PackageNotFound {
                identity: id.to_string(),
            });
        };

        // Full graph over the installed set for dependent queries.
        let mut graph = DependencyGraph::new();
        for (key, reference) in &installed_map {
            let dependencies = local
                .iter()
                .find(|p| id_key(&p.identity.id) == *key)
                .map(|p| p.dependencies.clone())
                .unwrap_or_default();
            graph.add_node(reference.identity.clone(), dependencies);
        }

        let mut removal: BTreeSet<String> = BTreeSet::new();
        removal.insert(target_key.clone());

        if options.remove_dependencies {
            expand_to_orphans(&graph, &mut removal, &target_key);
        }

        if !options.force_remove {
            for key in &removal {
                for dependent in graph.direct_dependents(key) {
                    if !removal.contains(&id_key(&dependent.id)) {
                        return Err(Error::PackageHasDependents {
                            identity: installed_map[key].identity.to_string(),
                            dependent: dependent.to_string(),
                        });
                    }
                }
            }
        }

        // Order dependents-first over the DAG restricted to the removal
        // set.
        let mut restricted = DependencyGraph::new();
        for key in &removal {
            let dependencies = graph
                .get(key)
                .map(|n| n.dependencies.clone())
                .unwrap_or_default();
            restricted.add_node(installed_map[key].identity.clone(), dependencies);
        }

        let actions: Vec<ProjectAction> = restricted
            .dependent_order()?
            .into_iter()
            .map(|identity| ProjectAction::Uninstall { identity })
            .collect();

        debug!(target = %target.identity, count = actions.len(), "planned uninstall");
        Ok(ActionPlan::new(actions))
    }
}

/// Grow `removal` with every transitive dependency of the target that
/// would end up with no dependents outside the removal set.
fn expand_to_orphans(graph: &DependencyGraph, removal: &mut BTreeSet<String>, target_key: &str) {
    // Forward closure of the target.
    let mut closure: BTreeSet<String> = BTreeSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(target_key.to_string());
    while let Some(key) = queue.pop_front() {
        if let Some(node) = graph.get(&key) {
            for dep in &node.dependencies {
                let dep_key = id_key(&dep.id);
                if graph.contains(&dep_key) && closure.insert(dep_key.clone()) {
                    queue.push_back(dep_key);
                }
            }
        }
    }

    // A dependency joins the removal set once every dependent of it is
    // already being removed; repeat to a fixed point.
    loop {
        let mut changed = false;
        for key in &closure {
            if removal.contains(key) {
                continue;
            }
            let orphaned = graph
                .direct_dependents(key)
                .iter()
                .all(|dependent| removal.contains(&id_key(&dependent.id)));
            if orphaned && removal.insert(key.clone()) {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PackageIdentity;
    use crate::source::PackageDependency;
    use crate::version::VersionRange;

    fn ident(id: &str, version: &str) -> PackageIdentity {
        PackageIdentity::new(id, version.parse().unwrap())
    }

    fn reference(id: &str, version: &str) -> PackageReference {
        PackageReference::new(ident(id, version), None)
    }

    fn resolved(id: &str, version: &str, deps: &[&str]) -> ResolvedPackage {
        ResolvedPackage {
            identity: ident(id, version),
            dependencies: deps
                .iter()
                .map(|d| PackageDependency {
                    id: d.to_string(),
                    range: VersionRange::all(),
                })
                .collect(),
            source: None,
        }
    }

    fn rendered(plan: &ActionPlan) -> Vec<String> {
        plan.actions.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_fresh_install_orders_dependencies_first() {
        let resolution = Resolution {
            packages: vec![
                resolved("jQuery", "1.4.4", &[]),
                resolved("jQuery.Validation", "1.13.1", &["jQuery"]),
            ],
        };
        let plan = ActionPlanner::plan_changes(&[], &resolution, false).unwrap();
        assert_eq!(
            rendered(&plan),
            vec!["install jQuery/1.4.4", "install jQuery.Validation/1.13.1"]
        );
    }

    #[test]
    fn test_version_change_produces_uninstall_then_install() {
        let installed = vec![reference("a", "1.0.0")];
        let resolution = Resolution {
            packages: vec![resolved("a", "2.0.0", &[])],
        };
        let plan = ActionPlanner::plan_changes(&installed, &resolution, false).unwrap();
        assert_eq!(
            rendered(&plan),
            vec!["uninstall a/1.0.0", "install a/2.0.0"]
        );
    }

    #[test]
    fn test_identical_versions_produce_no_actions() {
        let installed = vec![reference("a", "1.0.0")];
        let resolution = Resolution {
            packages: vec![resolved("a", "1.0.0", &[])],
        };
        let plan = ActionPlanner::plan_changes(&installed, &resolution, false).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_update_transition_ordering() {
        // a:1→2, b:1→2 (b depends on a), c:2→3 independent. All
        // uninstalls precede all installs; within uninstalls dependents
        // first; within installs dependencies first.
        let installed = vec![
            reference("a", "1.0.0"),
            reference("b", "1.0.0"),
            reference("c", "2.0.0"),
        ];
        let resolution = Resolution {
            packages: vec![
                resolved("a", "2.0.0", &[]),
                resolved("b", "2.0.0", &["a"]),
                resolved("c", "3.0.0", &[]),
            ],
        };
        let plan = ActionPlanner::plan_changes(&installed, &resolution, false).unwrap();

        let actions = rendered(&plan);
        let pos = |needle: &str| actions.iter().position(|a| a == needle).unwrap();
        assert_eq!(plan.summary().uninstalls, 3);
        assert_eq!(plan.summary().installs, 3);
        assert!(pos("uninstall b/1.0.0") < pos("uninstall a/1.0.0"));
        assert!(pos("install a/2.0.0") < pos("install b/2.0.0"));
        assert!(actions[..3].iter().all(|a| a.starts_with("uninstall")));
        assert!(actions[3..].iter().all(|a| a.starts_with("install")));
    }

    #[test]
    fn test_reinstall_emits_pairs_at_same_versions() {
        let installed = vec![
            reference("Microsoft.Net.Http", "2.2.22"),
            reference("Microsoft.Bcl", "1.1.9"),
            reference("Microsoft.Bcl.Build", "1.0.14"),
        ];
        let local = vec![
            resolved("Microsoft.Net.Http", "2.2.22", &["Microsoft.Bcl"]),
            resolved("Microsoft.Bcl", "1.1.9", &["Microsoft.Bcl.Build"]),
            resolved("Microsoft.Bcl.Build", "1.0.14", &[]),
        ];
        let plan = ActionPlanner::plan_reinstall(&installed, &local).unwrap();

        assert_eq!(
            rendered(&plan),
            vec![
                "uninstall Microsoft.Net.Http/2.2.22",
                "uninstall Microsoft.Bcl/1.1.9",
                "uninstall Microsoft.Bcl.Build/1.0.14",
                "install Microsoft.Bcl.Build/1.0.14",
                "install Microsoft.Bcl/1.1.9",
                "install Microsoft.Net.Http/2.2.22",
            ]
        );
    }

    #[test]
    fn test_uninstall_with_dependents_is_refused() {
        let installed = vec![
            reference("jQuery", "1.4.4"),
            reference("jQuery.Validation", "1.13.1"),
        ];
        let local = vec![
            resolved("jQuery", "1.4.4", &[]),
            resolved("jQuery.Validation", "1.13.1", &["jQuery"]),
        ];

        let err = ActionPlanner::plan_uninstall(
            &installed,
            &local,
            "jQuery",
            &UninstallationContext::default(),
        )
        .unwrap_err();

        match err {
            Error::PackageHasDependents { identity, dependent } => {
                assert_eq!(identity, "jQuery/1.4.4");
                assert_eq!(dependent, "jQuery.Validation/1.13.1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_force_remove_bypasses_guard() {
        let installed = vec![
            reference("jQuery", "1.4.4"),
            reference("jQuery.Validation", "1.13.1"),
        ];
        let local = vec![
            resolved("jQuery", "1.4.4", &[]),
            resolved("jQuery.Validation", "1.13.1", &["jQuery"]),
        ];

        let plan = ActionPlanner::plan_uninstall(
            &installed,
            &local,
            "jQuery",
            &UninstallationContext {
                force_remove: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rendered(&plan), vec!["uninstall jQuery/1.4.4"]);
    }

    #[test]
    fn test_remove_dependencies_takes_orphans_only() {
        // top -> shared <- keeper: removing top with remove_dependencies
        // takes solo (only top depends on it) but leaves shared.
        let installed = vec![
            reference("top", "1.0.0"),
            reference("shared", "1.0.0"),
            reference("solo", "1.0.0"),
            reference("keeper", "1.0.0"),
        ];
        let local = vec![
            resolved("top", "1.0.0", &["shared", "solo"]),
            resolved("shared", "1.0.0", &[]),
            resolved("solo", "1.0.0", &[]),
            resolved("keeper", "1.0.0", &["shared"]),
        ];

        let plan = ActionPlanner::plan_uninstall(
            &installed,
            &local,
            "top",
            &UninstallationContext {
                remove_dependencies: true,
                ..Default::default()
            },
        )
        .unwrap();

        let actions = rendered(&plan);
        assert!(actions.contains(&"uninstall top/1.0.0".to_string()));
        assert!(actions.contains(&"uninstall solo/1.0.0".to_string()));
        assert!(!actions.contains(&"uninstall shared/1.0.0".to_string()));
        // The root goes before its dependency.
        let pos = |needle: &str| actions.iter().position(|a| a == needle).unwrap();
        assert!(pos("uninstall top/1.0.0") < pos("uninstall solo/1.0.0"));
    }

    #[test]
    fn test_uninstall_of_unknown_package_fails() {
        let err = ActionPlanner::plan_uninstall(
            &[],
            &[],
            "ghost",
            &UninstallationContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { .. }));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let installed = vec![
            reference("zeta", "1.0.0"),
            reference("alpha", "1.0.0"),
            reference("mid", "1.0.0"),
        ];
        let resolution = || Resolution {
            packages: vec![
                resolved("zeta", "2.0.0", &[]),
                resolved("alpha", "2.0.0", &[]),
                resolved("mid", "2.0.0", &["alpha"]),
            ],
        };
        let first = ActionPlanner::plan_changes(&installed, &resolution(), false).unwrap();
        let second = ActionPlanner::plan_changes(&installed, &resolution(), false).unwrap();
        assert_eq!(rendered(&first), rendered(&second));
    }
}
