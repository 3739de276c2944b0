//! Ancestor schedules for requested output sets, and their per-graph cache.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::graph::compiled::ValueId;

/// Nodes and values one compute call actually touches: the minimal
/// ancestor sub-DAG of the requested outputs, in compiled topological
/// order. Schedules carry no tensor data; results are never cached.
#[derive(Debug)]
pub(crate) struct ExecutionPlan {
    /// Indices into the graph's node list, restricted to ancestors of the
    /// requested outputs, in topological order.
    pub nodes: Vec<usize>,
    /// Values the schedule reads, sorted. Inputs and constants outside
    /// this set are validated but never materialized.
    pub needed: Vec<ValueId>,
}

impl ExecutionPlan {
    pub fn needs(&self, value: ValueId) -> bool {
        self.needed.binary_search(&value).is_ok()
    }
}

/// Cache key: the requested output names in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PlanKey {
    outputs: Vec<String>,
}

impl PlanKey {
    /// `names` must already be sorted; output maps iterate in name order.
    pub fn new<'a>(names: impl Iterator<Item = &'a str>) -> Self {
        PlanKey {
            outputs: names.map(str::to_owned).collect(),
        }
    }
}

/// Configures how a graph caches execution schedules across compute calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanCachePolicy {
    /// Recompute the ancestor schedule on every call.
    Disabled,
    /// Keep up to `capacity` schedules keyed by requested output set.
    Lru { capacity: usize },
}

impl Default for PlanCachePolicy {
    fn default() -> Self {
        PlanCachePolicy::Lru { capacity: 16 }
    }
}

#[derive(Debug)]
pub(crate) enum PlanCacheState {
    Disabled,
    Enabled(Mutex<LruCache<PlanKey, Arc<ExecutionPlan>>>),
}

impl PlanCacheState {
    pub fn new(policy: PlanCachePolicy) -> Self {
        match policy {
            PlanCachePolicy::Disabled => PlanCacheState::Disabled,
            PlanCachePolicy::Lru { capacity } => {
                let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
                PlanCacheState::Enabled(Mutex::new(LruCache::new(capacity)))
            }
        }
    }

    pub fn get(&self, key: &PlanKey) -> Option<Arc<ExecutionPlan>> {
        match self {
            PlanCacheState::Disabled => None,
            PlanCacheState::Enabled(cache) => {
                let mut cache = cache.lock().expect("plan cache poisoned");
                cache.get(key).cloned()
            }
        }
    }

    pub fn put(&self, key: PlanKey, plan: Arc<ExecutionPlan>) {
        match self {
            PlanCacheState::Disabled => {}
            PlanCacheState::Enabled(cache) => {
                let mut cache = cache.lock().expect("plan cache poisoned");
                cache.put(key, plan);
            }
        }
    }
}
