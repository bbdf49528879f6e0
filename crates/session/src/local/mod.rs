//! In-process assignment service.
//!
//! [`LocalService`] owns an authoritative ring the same way a remote service
//! does: it names nodes and keys, places them, routes keys with the selected
//! strategy and reports movement statistics for every operation. The CLI demo
//! and the tests drive a [`Session`](crate::Session) with it.

pub mod router;

use crate::error::{Result, SessionError};
use crate::service::AssignmentService;
use crate::wire::{
    AlgorithmComparison, CapacityInfo, KeyMovement, Operation, Statistics, WireCapacityConfig,
    WireState,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use ring_layout::{Algorithm, CapacityConfig, NodeId};
use router::{unit_position, xxh64, RouterOptions};
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;
use tracing::debug;

/// Movements listed individually per operation.
pub const MAX_KEY_MOVEMENTS: usize = 20;

/// Largest key count accepted by `set_key_count`.
pub const MAX_KEY_COUNT: usize = 1000;

const INITIAL_NODES: usize = 3;
const INITIAL_KEYS: usize = 50;

/// Bounded-load expected keys are kept at least this multiple of the key
/// count when keys are regenerated or resized.
const EXPECTED_KEYS_HEADROOM: f64 = 1.5;

#[derive(Clone, Debug)]
struct Simulator {
    nodes: Vec<String>,
    keys: Vec<String>,
    algorithm: Algorithm,
    options: RouterOptions,
    next_id: u64,
    /// Result of the last routing pass; the baseline for the next one.
    assignments: HashMap<String, String>,
}

impl Simulator {
    fn new(nodes: usize, keys: usize) -> Self {
        let mut sim = Self {
            nodes: Vec::with_capacity(nodes),
            keys: Vec::new(),
            algorithm: Algorithm::Ring,
            options: RouterOptions::default(),
            next_id: 0,
            assignments: HashMap::new(),
        };
        for _ in 0..nodes {
            let id = sim.next_id("node");
            sim.nodes.push(id);
        }
        sim.regenerate_keys(keys);
        sim
    }

    /// Nodes and keys share one counter, so ids never repeat.
    fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{}-{}", prefix, self.next_id);
        self.next_id += 1;
        id
    }

    fn grow_expected_keys(&mut self, required: u64) {
        let capacity = self.options.capacity;
        if capacity.expected_keys() < required {
            self.options.capacity = capacity.with_expected_keys(required);
        }
    }

    fn bounded_headroom(&mut self) {
        if self.algorithm.is_bounded_load() {
            let required = (self.keys.len() as f64 * EXPECTED_KEYS_HEADROOM) as u64;
            self.grow_expected_keys(required);
        }
    }

    /// Routes every key with a freshly built router.
    ///
    /// Also returns the name of the router that did the routing.
    fn route(&self) -> (Vec<Option<usize>>, &'static str) {
        match router::build(&self.algorithm, &self.options, &self.nodes) {
            Some(mut router) => {
                let picks = self
                    .keys
                    .iter()
                    .map(|key| router.pick(key.as_bytes()))
                    .collect();
                (picks, router.name())
            }
            None => (vec![None; self.keys.len()], "none"),
        }
    }

    /// Reroutes all keys and reports what moved relative to the last pass.
    fn reroute(&mut self, operation: Operation) -> Statistics {
        let mut previous_dist = BTreeMap::new();
        for node in self.assignments.values().chain(self.nodes.iter()) {
            previous_dist.entry(node.clone()).or_insert(0);
        }
        for key in &self.keys {
            if let Some(node) = self.assignments.get(key) {
                *previous_dist.entry(node.clone()).or_insert(0) += 1;
            }
        }

        let bounded = self.algorithm.is_bounded_load();
        if bounded && !self.keys.is_empty() {
            let load_factor = self.options.capacity.load_factor();
            let minimum = (self.keys.len() as f64 / load_factor * 1.2) as u64;
            self.grow_expected_keys(minimum.max(self.keys.len() as u64));
        }

        let mut stats = Statistics {
            operation: operation.as_str().to_string(),
            total_keys: self.keys.len(),
            previous_dist,
            ..Statistics::default()
        };
        let mut current = HashMap::with_capacity(self.keys.len());
        let mut unassigned = 0;

        let (picks, router) = self.route();
        for (key, pick) in self.keys.iter().zip(picks) {
            let node = match pick {
                Some(slot) => &self.nodes[slot],
                None => {
                    unassigned += 1;
                    continue;
                }
            };
            *stats.distribution.entry(node.clone()).or_insert(0) += 1;

            match self.assignments.get(key) {
                Some(previous) if previous != node => {
                    stats.keys_moved += 1;
                    *stats.movement_by_node.entry(node.clone()).or_insert(0) += 1;
                    if stats.key_movements.len() < MAX_KEY_MOVEMENTS {
                        stats.key_movements.push(KeyMovement {
                            key_id: key.clone(),
                            from_node: previous.clone(),
                            to_node: node.clone(),
                        });
                    }
                }
                Some(_) => {}
                None => {
                    *stats.movement_by_node.entry(node.clone()).or_insert(0) += 1;
                }
            }
            current.insert(key.clone(), node.clone());
        }

        if stats.total_keys > 0 {
            stats.keys_moved_percent = stats.keys_moved as f64 / stats.total_keys as f64 * 100.0;
        }
        if bounded {
            stats.capacity_info = Some(self.capacity_info(&stats.distribution, unassigned));
        }
        self.assignments = current;

        debug!(
            operation = %operation,
            algorithm = %self.algorithm,
            router,
            moved = stats.keys_moved,
            unassigned,
            "keys rerouted"
        );
        stats
    }

    fn capacity_info(&self, distribution: &BTreeMap<String, usize>, unassigned: usize) -> CapacityInfo {
        let capacity = self.options.capacity.capacity_per_node(self.nodes.len());
        let mut info = CapacityInfo {
            unassigned_keys: unassigned,
            ..CapacityInfo::default()
        };
        for node in &self.nodes {
            let load = distribution.get(node).copied().unwrap_or(0);
            let percentage = if capacity == 0 {
                0.0
            } else {
                load as f64 / capacity as f64 * 100.0
            };
            if load as u64 >= capacity {
                info.nodes_at_capacity.push(node.clone());
            }
            info.capacity_per_node.insert(node.clone(), capacity);
            info.current_load.insert(node.clone(), load);
            info.load_percentage.insert(node.clone(), percentage);
        }
        info
    }

    fn add_node(&mut self) -> (String, Statistics) {
        let id = self.next_id("node");
        self.nodes.push(id.clone());
        (id, self.reroute(Operation::AddNode))
    }

    /// Unknown ids are a no-op. Removing the last node clears all
    /// assignments without statistics.
    fn remove_node(&mut self, node: &str) -> Option<Statistics> {
        let before = self.nodes.len();
        self.nodes.retain(|id| id != node);
        if self.nodes.len() == before {
            return None;
        }
        if self.nodes.is_empty() {
            self.assignments.clear();
            return None;
        }
        Some(self.reroute(Operation::RemoveNode))
    }

    fn regenerate_keys(&mut self, count: usize) -> Statistics {
        let keys = (0..count).map(|_| self.next_id("key")).collect();
        self.keys = keys;
        self.bounded_headroom();
        self.reroute(Operation::RegenerateKeys)
    }

    fn set_key_count(&mut self, count: usize) -> Statistics {
        if count < self.keys.len() {
            self.keys.truncate(count);
        } else {
            while self.keys.len() < count {
                let id = self.next_id("key");
                self.keys.push(id);
            }
        }
        self.bounded_headroom();
        self.reroute(Operation::SetKeyCount)
    }

    fn set_algorithm(&mut self, algorithm: &Algorithm) -> Result<Statistics> {
        if let Algorithm::Other(tag) = algorithm {
            return Err(SessionError::Service(format!("unknown algorithm: {}", tag)));
        }
        self.algorithm = algorithm.clone();
        Ok(self.reroute(Operation::SetAlgorithm))
    }

    fn set_capacity_config(&mut self, load_factor: f64, expected_keys: u64) -> Result<()> {
        if !self.algorithm.is_bounded_load() {
            return Err(SessionError::Service(
                "capacity config can only be set under the chbl algorithm".to_string(),
            ));
        }
        if expected_keys == 0 {
            return Err(SessionError::Service("expected keys must be > 0".to_string()));
        }
        self.options.capacity = CapacityConfig::new(load_factor, expected_keys)
            .map_err(|e| SessionError::Service(e.to_string()))?;
        // placement depends on capacity; the service reports no stats here
        let _ = self.reroute(Operation::SetAlgorithm);
        Ok(())
    }

    fn state(&self, stats: Option<Statistics>) -> WireState {
        let count = self.nodes.len();
        let mut positions = HashMap::with_capacity(count + self.keys.len());
        let mut node_angles = HashMap::with_capacity(count);

        for (slot, node) in self.nodes.iter().enumerate() {
            let angle = TAU * slot as f64 / count as f64;
            node_angles.insert(node.clone(), angle);
            positions.insert(node.clone(), angle / TAU);
        }
        for key in &self.keys {
            let hash = xxh64(key.as_bytes(), self.options.hash_seed);
            positions.insert(key.clone(), unit_position(hash));
        }

        let chbl_config = if self.algorithm.is_bounded_load() && count > 0 {
            let capacity = self.options.capacity;
            Some(WireCapacityConfig {
                load_factor: capacity.load_factor(),
                expected_keys: capacity.expected_keys(),
                capacity_per_node: capacity.capacity_per_node(count),
            })
        } else {
            None
        };

        WireState {
            nodes: self.nodes.clone(),
            keys: self.keys.clone(),
            positions,
            assignments: self.assignments.clone(),
            node_angles,
            algorithm: self.algorithm.as_str().to_string(),
            stats,
            chbl_config,
        }
    }

    /// Runs `operation` on a copy of this simulator for each known algorithm.
    fn compare(&self, operation: Operation, node: Option<&str>) -> Result<Vec<AlgorithmComparison>> {
        match (operation, node) {
            (Operation::AddNode, _) | (Operation::RegenerateKeys, _) => {}
            (Operation::RemoveNode, Some(id)) => {
                if !self.nodes.iter().any(|n| n == id) {
                    return Err(SessionError::Service(format!("unknown node: {}", id)));
                }
                if self.nodes.len() == 1 {
                    return Err(SessionError::Service(
                        "cannot compare removing the last node".to_string(),
                    ));
                }
            }
            (Operation::RemoveNode, None) => {
                return Err(SessionError::Service(
                    "remove-node comparison needs a node id".to_string(),
                ))
            }
            (other, _) => {
                return Err(SessionError::Service(format!(
                    "operation {} can't be compared",
                    other
                )))
            }
        }

        let mut results = Vec::with_capacity(4);
        for algorithm in Algorithm::known() {
            let mut sim = self.clone();
            sim.algorithm = algorithm.clone();
            sim.bounded_headroom();

            let stats = match (operation, node) {
                (Operation::AddNode, _) => Some(sim.add_node().1),
                (Operation::RemoveNode, Some(id)) => sim.remove_node(id),
                _ => {
                    let count = sim.keys.len();
                    Some(sim.regenerate_keys(count))
                }
            };

            results.push(AlgorithmComparison {
                algorithm: algorithm.as_str().to_string(),
                state: sim.state(stats.clone()),
                stats,
            });
        }
        Ok(results)
    }
}

/// [`AssignmentService`] running entirely in process.
///
/// Starts with three nodes and fifty keys under the plain ring.
pub struct LocalService {
    sim: Mutex<Simulator>,
}

impl Default for LocalService {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalService {
    pub fn new() -> Self {
        Self::with_size(INITIAL_NODES, INITIAL_KEYS)
    }

    /// Starts with `nodes` nodes and `keys` keys.
    pub fn with_size(nodes: usize, keys: usize) -> Self {
        Self {
            sim: Mutex::new(Simulator::new(nodes, keys)),
        }
    }

    pub fn node_count(&self) -> usize {
        self.sim.lock().nodes.len()
    }

    pub fn key_count(&self) -> usize {
        self.sim.lock().keys.len()
    }
}

#[async_trait]
impl AssignmentService for LocalService {
    async fn fetch_state(&self) -> Result<WireState> {
        Ok(self.sim.lock().state(None))
    }

    async fn add_node(&self) -> Result<WireState> {
        let mut sim = self.sim.lock();
        let (id, stats) = sim.add_node();
        debug!(node = %id, "node added");
        Ok(sim.state(Some(stats)))
    }

    async fn remove_node(&self, node: &NodeId) -> Result<WireState> {
        let mut sim = self.sim.lock();
        let stats = sim.remove_node(node.as_str());
        Ok(sim.state(stats))
    }

    async fn regenerate_keys(&self, count: usize) -> Result<WireState> {
        let mut sim = self.sim.lock();
        let stats = sim.regenerate_keys(count);
        Ok(sim.state(Some(stats)))
    }

    async fn set_key_count(&self, count: usize) -> Result<WireState> {
        let mut sim = self.sim.lock();
        let stats = sim.set_key_count(count.min(MAX_KEY_COUNT));
        Ok(sim.state(Some(stats)))
    }

    async fn set_algorithm(&self, algorithm: &Algorithm) -> Result<WireState> {
        let mut sim = self.sim.lock();
        let stats = sim.set_algorithm(algorithm)?;
        Ok(sim.state(Some(stats)))
    }

    async fn set_capacity_config(
        &self,
        load_factor: f64,
        expected_keys: u64,
    ) -> Result<WireState> {
        let mut sim = self.sim.lock();
        sim.set_capacity_config(load_factor, expected_keys)?;
        Ok(sim.state(None))
    }

    async fn compare_operation(
        &self,
        operation: Operation,
        node: Option<&NodeId>,
    ) -> Result<Vec<AlgorithmComparison>> {
        let sim = self.sim.lock().clone();
        sim.compare(operation, node.map(NodeId::as_str))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state() {
        let service = LocalService::new();
        let state = service.fetch_state().await.unwrap();
        assert_eq!(state.nodes, vec!["node-0", "node-1", "node-2"]);
        assert_eq!(state.keys.len(), 50);
        assert_eq!(state.keys[0], "key-3");
        assert_eq!(state.assignments.len(), 50);
        assert_eq!(state.algorithm, "ring");
        assert!(state.stats.is_none());
        assert!(state.chbl_config.is_none());
        assert!(state.positions.values().all(|p| (0.0..1.0).contains(p)));
    }

    #[tokio::test]
    async fn test_add_node_reports_movement() {
        let service = LocalService::new();
        let state = service.add_node().await.unwrap();
        assert_eq!(state.nodes.len(), 4);
        assert_eq!(state.nodes[3], "node-53");

        let stats = state.stats.unwrap();
        assert_eq!(stats.operation(), Some(Operation::AddNode));
        assert_eq!(stats.total_keys, 50);
        assert_eq!(stats.distribution.values().sum::<usize>(), 50);
        assert_eq!(stats.previous_dist.values().sum::<usize>(), 50);
        assert_eq!(stats.previous_dist.get("node-53"), Some(&0));
        // on a ring, keys only move to the new node
        assert!(stats.key_movements.iter().all(|m| m.to_node == "node-53"));
        assert!(stats.key_movements.len() <= MAX_KEY_MOVEMENTS);
    }

    #[tokio::test]
    async fn test_remove_unknown_node_is_noop() {
        let service = LocalService::new();
        let state = service.remove_node(&NodeId::from("node-99")).await.unwrap();
        assert_eq!(state.nodes.len(), 3);
        assert!(state.stats.is_none());
    }

    #[tokio::test]
    async fn test_remove_last_node_clears_assignments() {
        let service = LocalService::with_size(1, 10);
        let state = service.remove_node(&NodeId::from("node-0")).await.unwrap();
        assert!(state.nodes.is_empty());
        assert!(state.assignments.is_empty());
        assert_eq!(state.keys.len(), 10);
    }

    #[tokio::test]
    async fn test_set_key_count_truncates_and_caps() {
        let service = LocalService::new();
        let state = service.set_key_count(10).await.unwrap();
        assert_eq!(state.keys.len(), 10);
        assert_eq!(state.keys[0], "key-3");

        let state = service.set_key_count(5000).await.unwrap();
        assert_eq!(state.keys.len(), MAX_KEY_COUNT);
        assert_eq!(state.stats.unwrap().operation_label(), "Key Count Changed");
    }

    #[tokio::test]
    async fn test_bounded_load_state() {
        let service = LocalService::new();
        let state = service.set_algorithm(&Algorithm::BoundedLoad).await.unwrap();
        let config = state.chbl_config.unwrap();
        assert_eq!(config.load_factor, 1.25);
        assert_eq!(config.expected_keys, 1000);
        assert_eq!(config.capacity_per_node, 417);

        let info = state.stats.unwrap().capacity_info.unwrap();
        assert_eq!(info.unassigned_keys, 0);
        assert_eq!(info.capacity_per_node.get("node-0"), Some(&417));
        assert_eq!(info.current_load.values().sum::<usize>(), 50);
    }

    #[tokio::test]
    async fn test_capacity_config_rules() {
        let service = LocalService::new();
        let err = service.set_capacity_config(1.25, 100).await.unwrap_err();
        assert!(matches!(err, SessionError::Service(_)));

        service.set_algorithm(&Algorithm::BoundedLoad).await.unwrap();
        assert!(service.set_capacity_config(0.5, 100).await.is_err());
        assert!(service.set_capacity_config(1.5, 0).await.is_err());

        let state = service.set_capacity_config(1.0, 60).await.unwrap();
        let config = state.chbl_config.unwrap();
        assert_eq!(config.capacity_per_node, 20);
        let state = state.to_ring_state();
        assert!(state.loads().iter().all(|load| *load <= 20));
    }

    #[tokio::test]
    async fn test_unknown_algorithm_rejected() {
        let service = LocalService::new();
        let err = service
            .set_algorithm(&Algorithm::Other("rendezvous".into()))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(service.fetch_state().await.unwrap().algorithm, "ring");
    }

    #[tokio::test]
    async fn test_compare_leaves_service_untouched() {
        let service = LocalService::new();
        let results = service
            .compare_operation(Operation::AddNode, None)
            .await
            .unwrap();
        let algorithms: Vec<_> = results.iter().map(|r| r.algorithm.as_str()).collect();
        assert_eq!(algorithms, vec!["ring", "jump", "maglev", "chbl"]);
        assert!(results.iter().all(|r| r.state.nodes.len() == 4));
        assert!(results[3].state.chbl_config.is_some());
        assert_eq!(service.node_count(), 3);
    }

    #[tokio::test]
    async fn test_compare_rejects_bad_requests() {
        let service = LocalService::new();
        assert!(service
            .compare_operation(Operation::RemoveNode, None)
            .await
            .is_err());
        assert!(service
            .compare_operation(Operation::RemoveNode, Some(&NodeId::from("node-7")))
            .await
            .is_err());
        assert!(service
            .compare_operation(Operation::SetKeyCount, None)
            .await
            .is_err());

        let results = service
            .compare_operation(Operation::RemoveNode, Some(&NodeId::from("node-1")))
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.state.nodes.len() == 2));
    }
}
