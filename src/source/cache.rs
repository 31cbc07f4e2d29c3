// src/source/cache.rs

//! Per-resolution memo for dependency-info fetches.
//!
//! Keys are `(source url, identity, framework)`. Concurrent requests for
//! one key deduplicate to a single in-flight fetch sharing the result.
//! Fetch errors leave the cell unset so a later request retries; negative
//! lookups (the source does not know the identity) are cached.

use crate::error::Result;
use crate::framework::Framework;
use crate::identity::PackageIdentity;
use crate::source::ResolvedDependencyInfo;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Cache key: one source's view of one identity under one framework.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatherKey {
    pub source_url: String,
    pub identity: PackageIdentity,
    pub framework: Framework,
}

type Cell = Arc<OnceCell<Option<ResolvedDependencyInfo>>>;

/// Memoizes gather results for the lifetime of one resolution context.
#[derive(Debug, Default)]
pub struct GatherCache {
    entries: Mutex<HashMap<GatherKey, Cell>>,
}

impl GatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, or run `fetch` to produce it.
    ///
    /// At most one fetch per key is in flight at a time; racing callers
    /// wait on the winner's cell and share its value.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: GatherKey,
        fetch: F,
    ) -> Result<Option<ResolvedDependencyInfo>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<ResolvedDependencyInfo>>>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(key).or_default().clone()
        };
        cell.get_or_try_init(fetch).await.cloned()
    }

    /// Number of resolved keys, for diagnostics.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
