//! Immutable assignment snapshots.
//!
//! A [`RingState`] is everything the assignment service decided at one point
//! in time. The engine reads it and never mutates it; a new operation always
//! produces a whole new snapshot.

use crate::error::{Error, Result};
use crate::node::{KeyId, NodeId};
use crate::ring::position::{clamp_position, TAU};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Assignment strategy used by the service.
///
/// Unknown tags are preserved in [`Algorithm::Other`] so a newer service
/// can't break an older client.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Algorithm {
    /// Ring consistent hashing with virtual nodes
    Ring,
    /// Jump consistent hashing
    Jump,
    /// Maglev lookup table
    Maglev,
    /// Consistent hashing with bounded loads
    BoundedLoad,
    /// Any tag this client doesn't know
    Other(String),
}

impl Algorithm {
    /// The four variants the service is known to implement, in display order.
    pub fn known() -> [Algorithm; 4] {
        [
            Algorithm::Ring,
            Algorithm::Jump,
            Algorithm::Maglev,
            Algorithm::BoundedLoad,
        ]
    }

    /// Wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            Algorithm::Ring => "ring",
            Algorithm::Jump => "jump",
            Algorithm::Maglev => "maglev",
            Algorithm::BoundedLoad => "chbl",
            Algorithm::Other(tag) => tag,
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &str {
        match self {
            Algorithm::Ring => "Ring Consistent Hash",
            Algorithm::Jump => "Jump Consistent Hashing",
            Algorithm::Maglev => "Maglev",
            Algorithm::BoundedLoad => "CH-BL (Bounded Loads)",
            Algorithm::Other(tag) => tag,
        }
    }

    pub fn is_bounded_load(&self) -> bool {
        matches!(self, Algorithm::BoundedLoad)
    }
}

impl FromStr for Algorithm {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "ring" => Algorithm::Ring,
            "jump" => Algorithm::Jump,
            "maglev" => Algorithm::Maglev,
            "chbl" => Algorithm::BoundedLoad,
            other => Algorithm::Other(other.to_string()),
        })
    }
}

impl From<String> for Algorithm {
    fn from(tag: String) -> Self {
        match tag.parse() {
            Ok(algorithm) => algorithm,
            Err(never) => match never {},
        }
    }
}

impl From<Algorithm> for String {
    fn from(algorithm: Algorithm) -> Self {
        algorithm.as_str().to_string()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded-load capacity parameters.
///
/// The per-node capacity is not stored here: it is always derived from the
/// node count with [`CapacityConfig::capacity_per_node`], so it can't drift
/// from `ceil(load_factor * (expected_keys / nodes))`.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct CapacityConfig {
    load_factor: f64,
    expected_keys: u64,
}

impl CapacityConfig {
    /// Creates a validated config. `load_factor` must be a finite value >= 1.
    pub fn new(load_factor: f64, expected_keys: u64) -> Result<Self> {
        if !load_factor.is_finite() || load_factor < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "load factor must be >= 1, got {}",
                load_factor
            )));
        }
        Ok(Self {
            load_factor,
            expected_keys,
        })
    }

    /// Takes the service's parameters as sent.
    ///
    /// The service allows load factors below 1, so snapshots are not held
    /// to [`CapacityConfig::new`]'s bound. Returns `None` when the load
    /// factor isn't a finite positive number.
    pub fn from_service(load_factor: f64, expected_keys: u64) -> Option<Self> {
        if !load_factor.is_finite() || load_factor <= 0.0 {
            return None;
        }
        Some(Self {
            load_factor,
            expected_keys,
        })
    }

    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    pub fn expected_keys(&self) -> u64 {
        self.expected_keys
    }

    /// Same load factor, different expected key count.
    pub fn with_expected_keys(self, expected_keys: u64) -> Self {
        Self {
            expected_keys,
            ..self
        }
    }

    /// `ceil(load_factor * (expected_keys / node_count))`, or 0 with no nodes.
    ///
    /// The division happens first, as the service does it; the other order
    /// rounds differently for some inputs (1.05 over 700 keys on 3 nodes).
    pub fn capacity_per_node(&self, node_count: usize) -> u64 {
        if node_count == 0 {
            return 0;
        }
        let raw = self.load_factor * (self.expected_keys as f64 / node_count as f64);
        raw.ceil() as u64
    }
}

impl Default for CapacityConfig {
    /// Load factor 1.25 over 1000 expected keys.
    fn default() -> Self {
        Self {
            load_factor: 1.25,
            expected_keys: 1000,
        }
    }
}

/// One immutable assignment snapshot.
#[derive(Clone, Debug)]
pub struct RingState {
    nodes: Vec<NodeId>,
    slots: HashMap<NodeId, usize>,
    keys: Vec<KeyId>,
    positions: HashMap<String, f64>,
    assignment: HashMap<KeyId, NodeId>,
    node_angles: HashMap<NodeId, f64>,
    algorithm: Algorithm,
    capacity: Option<CapacityConfig>,
    capacity_per_node: u64,
}

impl RingState {
    pub fn builder() -> RingStateBuilder {
        RingStateBuilder::default()
    }

    /// Nodes in service order. A node's index here is its slot.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[KeyId] {
        &self.keys
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    pub fn capacity(&self) -> Option<&CapacityConfig> {
        self.capacity.as_ref()
    }

    /// Capacity derived from the config and the current node count
    /// (0 without a config).
    pub fn capacity_per_node(&self) -> u64 {
        self.capacity_per_node
    }

    /// Slot of a node, `None` if it isn't part of this snapshot.
    pub fn slot_of(&self, node: &str) -> Option<usize> {
        self.slots.get(node).copied()
    }

    /// Ring position of a key, clamped into `[0, 1)`; missing keys sit at 0.
    pub fn key_position(&self, key: &KeyId) -> f64 {
        self.position_or_default(key.as_str())
    }

    /// Ring position of a node, clamped into `[0, 1)`; missing nodes sit at 0.
    pub fn node_position(&self, node: &NodeId) -> f64 {
        self.position_or_default(node.as_str())
    }

    /// Raw position lookup, `None` when the service didn't send one.
    pub fn position(&self, id: &str) -> Option<f64> {
        self.positions.get(id).copied()
    }

    fn position_or_default(&self, id: &str) -> f64 {
        self.positions.get(id).copied().map(clamp_position).unwrap_or(0.0)
    }

    /// Angle at which a node is drawn.
    ///
    /// Uses the service's precomputed angle; falls back to even spacing by
    /// slot when it's missing.
    pub fn node_angle(&self, node: &NodeId) -> f64 {
        if let Some(angle) = self.node_angles.get(node) {
            if angle.is_finite() {
                return *angle;
            }
        }
        match self.slot_of(node.as_str()) {
            Some(slot) => TAU * slot as f64 / self.nodes.len() as f64,
            None => 0.0,
        }
    }

    /// The node a key was assigned to, exactly as the service sent it.
    pub fn raw_assignment(&self, key: &KeyId) -> Option<&NodeId> {
        self.assignment.get(key)
    }

    /// The node a key is assigned to, if that node is part of the snapshot.
    pub fn assigned_node(&self, key: &KeyId) -> Option<&NodeId> {
        self.assigned_slot(key).map(|slot| &self.nodes[slot])
    }

    /// Slot of the node a key is assigned to.
    ///
    /// Unassigned keys and dangling assignments both resolve to `None`.
    pub fn assigned_slot(&self, key: &KeyId) -> Option<usize> {
        self.assignment
            .get(key)
            .and_then(|node| self.slot_of(node.as_str()))
    }

    /// Number of keys assigned to each slot, indexed like [`RingState::nodes`].
    pub fn loads(&self) -> Vec<usize> {
        let mut loads = vec![0; self.nodes.len()];
        for key in &self.keys {
            if let Some(slot) = self.assigned_slot(key) {
                loads[slot] += 1;
            }
        }
        loads
    }

    /// Number of keys assigned to a node.
    pub fn load_of(&self, node: &NodeId) -> usize {
        match self.slot_of(node.as_str()) {
            Some(slot) => self
                .keys
                .iter()
                .filter(|key| self.assigned_slot(key) == Some(slot))
                .count(),
            None => 0,
        }
    }
}

/// Builder for [`RingState`].
///
/// Duplicate nodes and keys are dropped, keeping the first occurrence, so
/// the snapshot invariants hold no matter what the caller feeds in.
#[derive(Debug, Default)]
pub struct RingStateBuilder {
    nodes: Vec<NodeId>,
    keys: Vec<KeyId>,
    seen_keys: HashSet<KeyId>,
    positions: HashMap<String, f64>,
    assignment: HashMap<KeyId, NodeId>,
    node_angles: HashMap<NodeId, f64>,
    algorithm: Option<Algorithm>,
    capacity: Option<CapacityConfig>,
}

impl RingStateBuilder {
    pub fn node(mut self, id: impl Into<NodeId>) -> Self {
        self.nodes.push(id.into());
        self
    }

    pub fn nodes<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
    {
        self.nodes.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Adds a key with its position and the node it was assigned to.
    ///
    /// A key that was already added keeps its first position and owner.
    pub fn key(mut self, id: impl Into<KeyId>, position: f64, node: impl Into<NodeId>) -> Self {
        let id = id.into();
        if !self.seen_keys.insert(id.clone()) {
            return self;
        }
        self.positions.insert(id.0.clone(), position);
        self.assignment.insert(id.clone(), node.into());
        self.keys.push(id);
        self
    }

    /// Adds a key without position or assignment.
    pub fn bare_key(mut self, id: impl Into<KeyId>) -> Self {
        let id = id.into();
        if self.seen_keys.insert(id.clone()) {
            self.keys.push(id);
        }
        self
    }

    /// Sets the ring position of a key or node.
    pub fn position(mut self, id: impl Into<String>, position: f64) -> Self {
        self.positions.insert(id.into(), position);
        self
    }

    pub fn assign(mut self, key: impl Into<KeyId>, node: impl Into<NodeId>) -> Self {
        self.assignment.insert(key.into(), node.into());
        self
    }

    pub fn node_angle(mut self, node: impl Into<NodeId>, angle: f64) -> Self {
        self.node_angles.insert(node.into(), angle);
        self
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn capacity(mut self, config: CapacityConfig) -> Self {
        self.capacity = Some(config);
        self
    }

    pub fn build(self) -> RingState {
        let mut seen = HashSet::new();
        let nodes: Vec<NodeId> = self
            .nodes
            .into_iter()
            .filter(|node| seen.insert(node.clone()))
            .collect();

        let slots = nodes
            .iter()
            .enumerate()
            .map(|(slot, node)| (node.clone(), slot))
            .collect();

        let capacity_per_node = self
            .capacity
            .map(|config| config.capacity_per_node(nodes.len()))
            .unwrap_or(0);

        RingState {
            nodes,
            slots,
            keys: self.keys,
            positions: self.positions,
            assignment: self.assignment,
            node_angles: self.node_angles,
            algorithm: self.algorithm.unwrap_or(Algorithm::Ring),
            capacity: self.capacity,
            capacity_per_node,
        }
    }
}
