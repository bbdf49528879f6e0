//! Service wire format.
//!
//! JSON shapes exchanged with the assignment service. Field names are
//! camelCase on the wire. Collections the service may send as `null` decode
//! as empty.

use crate::error::Result;
use ring_layout::{Algorithm, CapacityConfig, RingState};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::warn;

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Full state object returned by every service operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireState {
    #[serde(default, deserialize_with = "nullable")]
    pub nodes: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub keys: Vec<String>,
    /// Key or node id → position in `[0, 1)`.
    #[serde(default, deserialize_with = "nullable")]
    pub positions: HashMap<String, f64>,
    /// Key id → node id.
    #[serde(default, deserialize_with = "nullable")]
    pub assignments: HashMap<String, String>,
    /// Node id → angle in radians.
    #[serde(default, deserialize_with = "nullable")]
    pub node_angles: HashMap<String, f64>,
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Statistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chbl_config: Option<WireCapacityConfig>,
}

/// Bounded-load parameters as sent by the service.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCapacityConfig {
    pub load_factor: f64,
    pub expected_keys: u64,
    pub capacity_per_node: u64,
}

impl WireState {
    /// Builds the engine snapshot.
    ///
    /// Never rejects a snapshot. The per-node capacity is recomputed from
    /// load factor, expected keys and node count, and a disagreeing service
    /// value is logged. A load factor that isn't finite and positive drops
    /// the capacity config instead of the snapshot.
    pub fn to_ring_state(&self) -> RingState {
        let mut builder = RingState::builder()
            .nodes(self.nodes.iter().map(String::as_str))
            .algorithm(Algorithm::from(self.algorithm.clone()));

        for key in &self.keys {
            builder = builder.bare_key(key.as_str());
        }
        for (id, position) in &self.positions {
            builder = builder.position(id.as_str(), *position);
        }
        for (key, node) in &self.assignments {
            builder = builder.assign(key.as_str(), node.as_str());
        }
        for (node, angle) in &self.node_angles {
            builder = builder.node_angle(node.as_str(), *angle);
        }
        if let Some(wire) = &self.chbl_config {
            match CapacityConfig::from_service(wire.load_factor, wire.expected_keys) {
                Some(config) => builder = builder.capacity(config),
                None => warn!(
                    load_factor = wire.load_factor,
                    "ignoring capacity config with unusable load factor"
                ),
            }
        }

        let state = builder.build();
        if let Some(wire) = &self.chbl_config {
            if state.capacity().is_some() && wire.capacity_per_node != state.capacity_per_node() {
                warn!(
                    sent = wire.capacity_per_node,
                    derived = state.capacity_per_node(),
                    "service capacity per node disagrees with its config"
                );
            }
        }
        state
    }
}

/// Movement statistics for the last operation.
///
/// Authoritative: the client displays these and never recomputes churn
/// from two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub operation: String,
    pub total_keys: usize,
    pub keys_moved: usize,
    pub keys_moved_percent: f64,
    /// Node → keys it received (moved in or newly placed).
    #[serde(default, deserialize_with = "nullable")]
    pub movement_by_node: BTreeMap<String, usize>,
    /// Node → current key count.
    #[serde(default, deserialize_with = "nullable")]
    pub distribution: BTreeMap<String, usize>,
    /// Node → key count before the operation.
    #[serde(default, deserialize_with = "nullable")]
    pub previous_dist: BTreeMap<String, usize>,
    /// Individual movements; the service caps this list.
    #[serde(default, deserialize_with = "nullable")]
    pub key_movements: Vec<KeyMovement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_info: Option<CapacityInfo>,
}

impl Statistics {
    /// Parsed operation, `None` for tags this client doesn't know.
    pub fn operation(&self) -> Option<Operation> {
        self.operation.parse().ok()
    }

    /// Title for the operation, falling back to the raw tag.
    pub fn operation_label(&self) -> &str {
        match self.operation() {
            Some(op) => op.label(),
            None => &self.operation,
        }
    }
}

/// One key moving between nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMovement {
    pub key_id: String,
    pub from_node: String,
    pub to_node: String,
}

/// Bounded-load capacity shortfall report.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityInfo {
    #[serde(default, deserialize_with = "nullable")]
    pub nodes_at_capacity: Vec<String>,
    pub unassigned_keys: usize,
    #[serde(default, deserialize_with = "nullable")]
    pub capacity_per_node: BTreeMap<String, u64>,
    #[serde(default, deserialize_with = "nullable")]
    pub current_load: BTreeMap<String, usize>,
    #[serde(default, deserialize_with = "nullable")]
    pub load_percentage: BTreeMap<String, f64>,
}

/// Result of running one operation under one algorithm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmComparison {
    pub algorithm: String,
    pub state: WireState,
    #[serde(default)]
    pub stats: Option<Statistics>,
}

/// State-changing operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    AddNode,
    RemoveNode,
    RegenerateKeys,
    SetAlgorithm,
    SetKeyCount,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::AddNode => "add-node",
            Operation::RemoveNode => "remove-node",
            Operation::RegenerateKeys => "regenerate-keys",
            Operation::SetAlgorithm => "set-algorithm",
            Operation::SetKeyCount => "set-key-count",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Operation::AddNode => "Node Added",
            Operation::RemoveNode => "Node Removed",
            Operation::RegenerateKeys => "Keys Regenerated",
            Operation::SetAlgorithm => "Algorithm Changed",
            Operation::SetKeyCount => "Key Count Changed",
        }
    }

    /// Whether the service can run this operation across all algorithms.
    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            Operation::AddNode | Operation::RemoveNode | Operation::RegenerateKeys
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "add-node" => Ok(Operation::AddNode),
            "remove-node" => Ok(Operation::RemoveNode),
            "regenerate-keys" => Ok(Operation::RegenerateKeys),
            "set-algorithm" => Ok(Operation::SetAlgorithm),
            "set-key-count" => Ok(Operation::SetKeyCount),
            other => Err(format!("unknown operation: {}", other)),
        }
    }
}

// ============================================================================
// Envelopes
// ============================================================================

/// `{"state": ...}` response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateEnvelope {
    pub state: WireState,
}

/// `POST /add-node` response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodeEnvelope {
    pub node_id: String,
    pub state: WireState,
}

/// `POST /compare-operation` response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComparisonEnvelope {
    #[serde(default, deserialize_with = "nullable")]
    pub comparison: Vec<AlgorithmComparison>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StateDocument {
    Envelope { state: WireState },
    Bare(WireState),
}

/// Decodes a state document, with or without the `{"state": ...}` envelope.
pub fn decode_state(json: &str) -> Result<WireState> {
    let document: StateDocument = serde_json::from_str(json)?;
    Ok(match document {
        StateDocument::Envelope { state } => state,
        StateDocument::Bare(state) => state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring_layout::KeyId;

    const SAMPLE: &str = r#"{
        "state": {
            "nodes": ["node-0", "node-1"],
            "keys": ["key-2", "key-3"],
            "positions": {"node-0": 0, "node-1": 0.5, "key-2": 0.25, "key-3": 0.75},
            "assignments": {"key-2": "node-1", "key-3": "node-0"},
            "nodeAngles": {"node-0": 0, "node-1": 3.14159},
            "algorithm": "chbl",
            "stats": {
                "operation": "add-node",
                "totalKeys": 2,
                "keysMoved": 1,
                "keysMovedPercent": 50,
                "movementByNode": {"node-1": 1},
                "distribution": {"node-0": 1, "node-1": 1},
                "previousDist": {"node-0": 2, "node-1": 0},
                "keyMovements": [{"keyId": "key-2", "fromNode": "node-0", "toNode": "node-1"}],
                "capacityInfo": {
                    "nodesAtCapacity": null,
                    "unassignedKeys": 0,
                    "capacityPerNode": {"node-0": 625},
                    "currentLoad": {"node-0": 1},
                    "loadPercentage": {"node-0": 0.16}
                }
            },
            "chblConfig": {"loadFactor": 1.25, "expectedKeys": 1000, "capacityPerNode": 625}
        }
    }"#;

    #[test]
    fn test_decode_envelope() {
        let state = decode_state(SAMPLE).unwrap();
        assert_eq!(state.nodes, vec!["node-0", "node-1"]);
        assert_eq!(state.algorithm, "chbl");

        let stats = state.stats.as_ref().unwrap();
        assert_eq!(stats.operation(), Some(Operation::AddNode));
        assert_eq!(stats.operation_label(), "Node Added");
        assert_eq!(stats.key_movements[0].to_node, "node-1");
        assert!(stats.capacity_info.as_ref().unwrap().nodes_at_capacity.is_empty());
    }

    #[test]
    fn test_decode_bare_state() {
        let state = decode_state(r#"{"nodes": [], "keys": null, "algorithm": "ring"}"#).unwrap();
        assert!(state.keys.is_empty());
        assert!(state.stats.is_none());
    }

    #[test]
    fn test_to_ring_state() {
        let state = decode_state(SAMPLE).unwrap().to_ring_state();
        assert_eq!(state.algorithm(), &Algorithm::BoundedLoad);
        assert_eq!(state.capacity_per_node(), 625);
        assert_eq!(state.key_position(&KeyId::from("key-2")), 0.25);
        assert_eq!(state.assigned_slot(&KeyId::from("key-2")), Some(1));
    }

    #[test]
    fn test_small_load_factor_accepted() {
        let mut wire = decode_state(SAMPLE).unwrap();
        wire.chbl_config = Some(WireCapacityConfig {
            load_factor: 0.5,
            expected_keys: 10,
            capacity_per_node: 3,
        });
        let state = wire.to_ring_state();
        assert_eq!(state.capacity().map(|c| c.load_factor()), Some(0.5));
        assert_eq!(state.capacity_per_node(), 3);
    }

    #[test]
    fn test_unusable_load_factor_drops_capacity() {
        let mut wire = decode_state(SAMPLE).unwrap();
        wire.chbl_config = Some(WireCapacityConfig {
            load_factor: -1.0,
            expected_keys: 10,
            capacity_per_node: 0,
        });
        let state = wire.to_ring_state();
        assert!(state.capacity().is_none());
        assert_eq!(state.nodes().len(), 2);
    }

    #[test]
    fn test_service_capacity_rounding_matches() {
        let wire = WireState {
            nodes: vec!["node-0".into(), "node-1".into(), "node-2".into()],
            algorithm: "chbl".into(),
            chbl_config: Some(WireCapacityConfig {
                load_factor: 1.05,
                expected_keys: 700,
                capacity_per_node: 246,
            }),
            ..WireState::default()
        };
        assert_eq!(wire.to_ring_state().capacity_per_node(), 246);
    }

    #[test]
    fn test_unknown_operation_label() {
        let stats = Statistics {
            operation: "rebalance".into(),
            ..Statistics::default()
        };
        assert_eq!(stats.operation(), None);
        assert_eq!(stats.operation_label(), "rebalance");
    }

    #[test]
    fn test_wire_round_trip_keeps_camel_case() {
        let state = decode_state(SAMPLE).unwrap();
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("nodeAngles").is_some());
        assert!(json.get("chblConfig").is_some());
    }
}
