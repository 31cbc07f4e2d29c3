// src/resolver/mod.rs

//! Dependency resolution
//!
//! This module turns targets plus the installed set into a consistent set
//! of package identities: the dependency graph, the per-operation context,
//! and the resolver engine itself.

mod context;
mod engine;
mod graph;

pub use context::ResolutionContext;
pub use engine::{Resolution, ResolvedPackage, Resolver, ResolveTarget};
pub use graph::{DependencyGraph, DependencyNode};
