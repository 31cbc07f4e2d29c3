// src/lib.rs

//! nupack — package management core
//!
//! The resolver, planner, and applier behind a flat-manifest package
//! manager: given a project's installed packages and one or more targets,
//! compute a correct ordered list of uninstall/install actions, validate
//! it against version and framework constraints, and apply it atomically
//! to the project manifest and the shared package store.
//!
//! # Architecture
//!
//! - Leaf-first: versions and identities at the bottom, the manager façade
//!   at the top
//! - Flat manifest: project state is the ordered `packages.config` entry
//!   list; no lock file
//! - Plans before mutations: every operation resolves and orders its
//!   actions completely before the first byte changes on disk
//! - Shared store: one directory per identity, reference-counted across
//!   the projects of a solution

mod error;

pub mod framework;
pub mod identity;
pub mod manager;
pub mod package;
pub mod project;
pub mod resolver;
pub mod solution;
pub mod source;
pub mod store;
pub mod transaction;
pub mod version;

pub use error::{Error, Result};
pub use framework::Framework;
pub use identity::PackageIdentity;
pub use manager::PackageManager;
pub use project::{
    Applier, ExecutionContext, ManifestFile, PackageReference, Project, ProjectContext,
    ProjectSystem, UninstallationContext,
};
pub use resolver::{
    DependencyGraph, Resolution, ResolutionContext, ResolvedPackage, Resolver, ResolveTarget,
};
pub use solution::SolutionManager;
pub use source::{
    GatherCache, InMemorySource, PackageDependency, PackageSource, ResolvedDependencyInfo, Source,
    SourceGateway,
};
pub use store::FolderStore;
pub use transaction::{ActionPlan, ActionPlanner, PlanSummary, ProjectAction};
pub use version::{DependencyBehavior, PackageVersion, VersionConstraints, VersionRange};
