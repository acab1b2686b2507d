//! Per-run shared state.
//!
//! The verification cache and the reachability probe cell are the only
//! mutable state shared across a scan. Both live here, are created fresh for
//! each run and are dropped with it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::types::{ExecutionMode, VerificationResult};

/// Cache key: normalized `owner/repo` plus lowercase commit SHA.
pub(crate) type CacheKey = (String, String);

/// State scoped to a single scan run.
#[derive(Debug)]
pub struct RunContext {
    mode: ExecutionMode,
    /// One cell per key; concurrent callers await the same in-flight lookup.
    cache: Mutex<HashMap<CacheKey, Arc<OnceCell<VerificationResult>>>>,
    /// Outcome of the reachability probe (`true` = reachable).
    probe: OnceCell<bool>,
}

impl RunContext {
    pub fn new(mode: ExecutionMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            cache: Mutex::new(HashMap::new()),
            probe: OnceCell::new(),
        })
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Cell for `key`, inserted if absent.
    pub(crate) async fn cache_cell(&self, key: CacheKey) -> Arc<OnceCell<VerificationResult>> {
        let mut cache = self.cache.lock().await;
        cache.entry(key).or_default().clone()
    }

    pub(crate) fn probe_cell(&self) -> &OnceCell<bool> {
        &self.probe
    }

    /// Number of distinct `(repo, sha)` pairs looked up so far.
    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Whether the reachability probe has completed in this run.
    pub fn probed(&self) -> bool {
        self.probe.initialized()
    }
}
