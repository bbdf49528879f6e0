//! Tooltip explanations.
//!
//! Maps the current algorithm onto one of four rationale templates and fills
//! in numbers from the snapshot. Nothing here computes placement; it only
//! explains the placement the service already made.

use crate::capacity::{CapacityAnnotator, CapacityStatus};
use crate::node::{KeyId, NodeId};
use crate::state::{Algorithm, RingState};
use serde::Serialize;

/// Rationale template.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Template {
    RingWalk,
    DirectFunction,
    TableLookup,
    RingWalkWithCapacityCheck,
    /// Fallback for algorithm tags this client doesn't know.
    Generic,
}

impl Template {
    pub fn for_algorithm(algorithm: &Algorithm) -> Self {
        match algorithm {
            Algorithm::Ring => Template::RingWalk,
            Algorithm::Jump => Template::DirectFunction,
            Algorithm::Maglev => Template::TableLookup,
            Algorithm::BoundedLoad => Template::RingWalkWithCapacityCheck,
            Algorithm::Other(_) => Template::Generic,
        }
    }
}

/// What the pointer is over.
#[derive(Copy, Clone, Debug)]
pub enum HoverTarget<'a> {
    Node(&'a NodeId),
    Key(&'a KeyId),
}

/// A labelled value shown above the rationale.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Fact {
    pub label: String,
    pub value: String,
}

impl Fact {
    fn new(label: &str, value: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            value: value.into(),
        }
    }
}

/// Structured tooltip content.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Explanation {
    pub template: Template,
    pub title: String,
    pub facts: Vec<Fact>,
    pub heading: String,
    pub rationale: String,
    /// Numbered walk-through, only for the capacity template.
    pub steps: Vec<String>,
    /// Where the key sits in degrees. Keys only.
    pub footnote: Option<String>,
    /// Capacity bound under the capacity template.
    pub capacity_note: Option<String>,
}

/// Produces [`Explanation`]s for hovered nodes and keys.
pub struct ExplanationResolver;

impl ExplanationResolver {
    pub fn resolve(
        state: &RingState,
        target: HoverTarget<'_>,
        capacity: Option<&CapacityStatus>,
    ) -> Explanation {
        match target {
            HoverTarget::Node(node) => Self::explain_node(state, node),
            HoverTarget::Key(key) => Self::explain_key(state, key, capacity),
        }
    }

    pub fn explain_node(state: &RingState, node: &NodeId) -> Explanation {
        let template = Template::for_algorithm(state.algorithm());
        let rationale = match template {
            Template::RingWalk => "Keys hash to positions on the ring. This node owns all keys \
                between its position and the next node clockwise."
                .to_string(),
            Template::DirectFunction => "The jump function calculates which node this key \
                belongs to based on a mathematical formula, ensuring minimal movement when \
                nodes change."
                .to_string(),
            Template::TableLookup => "Keys hash to a lookup table slot. This node was assigned \
                to that slot during table construction using a permutation algorithm."
                .to_string(),
            Template::RingWalkWithCapacityCheck => "Keys hash to the ring, then walk clockwise \
                to find this node. If nodes are at capacity, keys continue walking to find \
                available capacity."
                .to_string(),
            Template::Generic => format!(
                "Keys are placed on this node by the '{}' strategy chosen by the service.",
                state.algorithm()
            ),
        };

        Explanation {
            template,
            title: format!("Node: {}", node),
            facts: vec![Fact::new("Keys assigned", state.load_of(node).to_string())],
            heading: "Why keys go here".to_string(),
            rationale,
            steps: Vec::new(),
            footnote: None,
            capacity_note: None,
        }
    }

    /// Explains one key.
    ///
    /// `capacity` is the owner's status from the current layout. When it's
    /// missing under the capacity template it is derived from the snapshot.
    pub fn explain_key(
        state: &RingState,
        key: &KeyId,
        capacity: Option<&CapacityStatus>,
    ) -> Explanation {
        let template = Template::for_algorithm(state.algorithm());
        let position = state.key_position(key);
        let percent = format!("{:.2}", position * 100.0);
        let owner = state
            .assigned_node(key)
            .map(|node| node.to_string())
            .unwrap_or_else(|| "unassigned".to_string());

        let facts = vec![
            Fact::new("Assigned to", owner.clone()),
            Fact::new("Position", format!("{}% around ring", percent)),
        ];
        let footnote = Some(format!(
            "Position {}% means the key landed at {:.1}° around the circular ring.",
            percent,
            position * 360.0
        ));

        let mut steps = Vec::new();
        let rationale = match template {
            Template::RingWalk => format!(
                "This key hashed to position {}% on the ring. Moving clockwise from this \
                 position, {} is the first node encountered (its vnodes are positioned on \
                 the ring).",
                percent, owner
            ),
            Template::DirectFunction => format!(
                "The jump consistent hash function directly calculated that this key belongs \
                 to {} using the formula: bucket = jump(hash(key), numNodes). No ring \
                 traversal needed!",
                owner
            ),
            Template::TableLookup => format!(
                "This key hashed to a lookup table slot (position {}% maps to a table index). \
                 That slot was assigned to {} during the Maglev permutation table \
                 construction.",
                percent, owner
            ),
            Template::RingWalkWithCapacityCheck => {
                let derived;
                let status = match capacity {
                    Some(status) => Some(status),
                    None => {
                        derived = state
                            .assigned_node(key)
                            .and_then(|node| CapacityAnnotator::status_for(state, node));
                        derived.as_ref()
                    }
                };
                let load = match status {
                    Some(status) => format!("{}/{}", status.current_load, status.capacity),
                    None => "N/A".to_string(),
                };
                steps = vec![
                    "Key starts at hash position on ring".to_string(),
                    format!("Finds first node clockwise ({})", owner),
                    format!("Checks if node has capacity (current: {})", load),
                    "If at capacity, continues walking clockwise to next node".to_string(),
                    "Assigns to first node with available capacity".to_string(),
                ];
                format!("This key hashed to position {}% on the ring.", percent)
            }
            Template::Generic => format!(
                "This key sits at position {}% and was assigned to {} by the '{}' strategy.",
                percent,
                owner,
                state.algorithm()
            ),
        };

        let capacity_note = match (template, state.capacity()) {
            (Template::RingWalkWithCapacityCheck, Some(config)) => Some(format!(
                "This ensures no node exceeds {} keys (Load Factor: {} × Expected Keys: {})",
                state.capacity_per_node(),
                config.load_factor(),
                config.expected_keys()
            )),
            (Template::RingWalkWithCapacityCheck, None) => Some(
                "This ensures no node exceeds N/A keys (Load Factor: N/A × Expected Keys: N/A)"
                    .to_string(),
            ),
            _ => None,
        };

        Explanation {
            template,
            title: format!("Key: {}", key),
            facts,
            heading: "Why this assignment".to_string(),
            rationale,
            steps,
            footnote,
            capacity_note,
        }
    }
}
