// src/resolver/context.rs

//! Per-operation resolution policy.
//!
//! One `ResolutionContext` is created per public operation and owns that
//! operation's gather cache; nothing here is process-global.

use crate::source::GatherCache;
use crate::version::{DependencyBehavior, VersionConstraints};

/// Policy bundle for one resolution: dependency behavior, prerelease and
/// unlisted admission, exact-segment constraints, and the gather cache.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    pub dependency_behavior: DependencyBehavior,
    pub include_prerelease: bool,
    pub include_unlisted: bool,
    pub version_constraints: VersionConstraints,
    pub gather_cache: GatherCache,
}

impl ResolutionContext {
    pub fn new(dependency_behavior: DependencyBehavior) -> Self {
        Self {
            dependency_behavior,
            ..Self::default()
        }
    }

    pub fn with_prerelease(mut self, include: bool) -> Self {
        self.include_prerelease = include;
        self
    }

    pub fn with_unlisted(mut self, include: bool) -> Self {
        self.include_unlisted = include;
        self
    }

    pub fn with_constraints(mut self, constraints: VersionConstraints) -> Self {
        self.version_constraints = constraints;
        self
    }

    /// Whether this context pins every segment: the reinstall mode.
    pub fn is_reinstall(&self) -> bool {
        self.version_constraints
            .contains(VersionConstraints::EXACT_ALL)
    }
}
