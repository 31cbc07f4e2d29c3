// src/transaction/mod.rs

//! Action plans for project changes
//!
//! A plan is the complete ordered list of uninstall/install actions for
//! one project, computed before anything mutates. Every uninstall precedes
//! every install; uninstalls run dependents-first and installs run
//! dependencies-first.

mod planner;

pub use planner::ActionPlanner;

use crate::identity::PackageIdentity;
use crate::source::PackageSource;
use std::fmt;

/// One step of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectAction {
    /// Remove the identity from the manifest and, when unreferenced
    /// elsewhere, from the store.
    Uninstall { identity: PackageIdentity },
    /// Materialize the identity and add it to the manifest. The source is
    /// the feed that resolved it, when known.
    Install {
        identity: PackageIdentity,
        source: Option<PackageSource>,
    },
}

impl ProjectAction {
    pub fn identity(&self) -> &PackageIdentity {
        match self {
            ProjectAction::Uninstall { identity } => identity,
            ProjectAction::Install { identity, .. } => identity,
        }
    }

    pub fn is_install(&self) -> bool {
        matches!(self, ProjectAction::Install { .. })
    }
}

impl fmt::Display for ProjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectAction::Uninstall { identity } => write!(f, "uninstall {identity}"),
            ProjectAction::Install { identity, .. } => write!(f, "install {identity}"),
        }
    }
}

/// The ordered action list for one project.
#[derive(Debug, Default)]
pub struct ActionPlan {
    pub actions: Vec<ProjectAction>,
}

impl ActionPlan {
    pub fn new(actions: Vec<ProjectAction>) -> Self {
        Self { actions }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn uninstalls(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.actions.iter().filter_map(|a| match a {
            ProjectAction::Uninstall { identity } => Some(identity),
            _ => None,
        })
    }

    pub fn installs(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.actions.iter().filter_map(|a| match a {
            ProjectAction::Install { identity, .. } => Some(identity),
            _ => None,
        })
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            total: self.actions.len(),
            installs: self.actions.iter().filter(|a| a.is_install()).count(),
            uninstalls: self.actions.iter().filter(|a| !a.is_install()).count(),
        }
    }
}

/// Counts for display and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    pub total: usize,
    pub installs: usize,
    pub uninstalls: usize,
}
