//! Correlation context shared across scenarios, and the interface-only
//! suite orchestrator contract that sits above a single `TestRunner`.
//!
//! `CorrelationContext`'s weighted pool selection is grounded directly on
//! `multi_scenario.rs::ScenarioSelector`'s cumulative-weight binary search,
//! generalized from "select a `Scenario`" to "select any pooled value".
//! `SuiteOrchestrator` itself is sketched only at its interface to the
//! core — implementing scenario sequencing/parallelism is explicitly a
//! surrounding concern.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use crate::runner::TestResult;

/// One weighted pool entry.
#[derive(Debug, Clone)]
struct PooledValue {
    value: Value,
    weight: f64,
}

/// A keyed value store plus keyed weighted pools, shared across scenarios
/// in a suite. The core treats a context's contents as opaque; it only
/// moves it between runners.
pub struct CorrelationContext {
    values: RwLock<HashMap<String, Value>>,
    pools: RwLock<HashMap<String, (Vec<PooledValue>, f64)>>,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.write().unwrap().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().unwrap().get(key).cloned()
    }

    /// Adds `value` to the pool named `key` with the given weight. Rejects
    /// non-positive weights by simply not adding them (mirroring
    /// `ScenarioSelector`'s rejection of zero/negative-weight entries,
    /// without panicking — this runs at request time, not construction).
    pub fn add_to_pool(&self, key: &str, value: Value, weight: f64) {
        if weight <= 0.0 {
            return;
        }
        let mut pools = self.pools.write().unwrap();
        let (entries, total_weight) = pools
            .entry(key.to_string())
            .or_insert_with(|| (Vec::new(), 0.0));
        entries.push(PooledValue { value, weight });
        *total_weight += weight;
    }

    /// Weighted random selection via cumulative-weight binary search, as
    /// in `ScenarioSelector::select`. Returns `None` if the pool is empty
    /// or unknown.
    pub fn sample_from_pool(&self, key: &str) -> Option<Value> {
        let pools = self.pools.read().unwrap();
        let (entries, total_weight) = pools.get(key)?;
        if entries.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        let target = rng.gen_range(0.0..*total_weight);

        let mut cumulative = 0.0;
        let mut cumulative_weights = Vec::with_capacity(entries.len());
        for entry in entries {
            cumulative += entry.weight;
            cumulative_weights.push(cumulative);
        }

        let index = cumulative_weights
            .binary_search_by(|w| if *w <= target { Ordering::Less } else { Ordering::Greater })
            .unwrap_or_else(|i| i);

        entries.get(index).map(|e| e.value.clone())
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// External contract only: runs a sequence of scenarios (each backed by a
/// `TestRunner`), sharing one `CorrelationContext` across them. Sequencing
/// policy (ordered vs. parallel scenarios) is a surrounding concern this
/// crate does not implement.
#[async_trait]
pub trait SuiteOrchestrator: Send + Sync {
    async fn run(&self, context: &CorrelationContext) -> Vec<TestResult>;
}
