//! Capacity annotation for the bounded-load variant.
//!
//! The service already enforced capacity when it assigned keys. This module
//! only reports how full each node is; it never moves or rejects a key.

use crate::node::{Color, NodeId};
use crate::state::RingState;
use serde::Serialize;

/// Load percentage at which a node turns [`CapacityTier::Warning`].
pub const WARNING_PERCENT: f64 = 70.0;

/// Load percentage at which a node turns [`CapacityTier::Critical`].
pub const CRITICAL_PERCENT: f64 = 90.0;

/// Three-level load status.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityTier {
    Normal,
    Warning,
    Critical,
}

impl CapacityTier {
    pub fn from_percentage(load_percentage: f64) -> Self {
        if load_percentage >= CRITICAL_PERCENT {
            CapacityTier::Critical
        } else if load_percentage >= WARNING_PERCENT {
            CapacityTier::Warning
        } else {
            CapacityTier::Normal
        }
    }

    pub fn color(&self) -> Color {
        match self {
            CapacityTier::Normal => Color::rgb(0x34, 0xa8, 0x53),
            CapacityTier::Warning => Color::rgb(0xfb, 0xbc, 0x04),
            CapacityTier::Critical => Color::rgb(0xea, 0x43, 0x35),
        }
    }
}

/// Load report for one node.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct CapacityStatus {
    pub node: NodeId,
    pub slot: usize,
    pub current_load: usize,
    pub capacity: u64,
    /// `100 * current_load / capacity`, 0 when capacity is 0.
    pub load_percentage: f64,
    pub tier: CapacityTier,
}

impl CapacityStatus {
    /// Fill ratio of a capacity bar, clamped to `[0, 1]`.
    pub fn fill_ratio(&self) -> f64 {
        (self.load_percentage / 100.0).clamp(0.0, 1.0)
    }

    /// Badge text, e.g. `"12/313 keys"`.
    pub fn label(&self) -> String {
        format!("{}/{} keys", self.current_load, self.capacity)
    }
}

/// Computes [`CapacityStatus`] records.
pub struct CapacityAnnotator;

impl CapacityAnnotator {
    /// True when the snapshot is bounded-load and carries a capacity config.
    pub fn engages(state: &RingState) -> bool {
        state.algorithm().is_bounded_load() && state.capacity().is_some()
    }

    /// One status per node, in node order. Empty when not engaged.
    pub fn annotate(state: &RingState) -> Vec<CapacityStatus> {
        if !Self::engages(state) {
            return Vec::new();
        }
        let capacity = state.capacity_per_node();
        state
            .loads()
            .into_iter()
            .enumerate()
            .map(|(slot, load)| status(state.nodes()[slot].clone(), slot, load, capacity))
            .collect()
    }

    /// Status for one node, `None` when not engaged or the node is unknown.
    pub fn status_for(state: &RingState, node: &NodeId) -> Option<CapacityStatus> {
        if !Self::engages(state) {
            return None;
        }
        let slot = state.slot_of(node.as_str())?;
        Some(status(
            node.clone(),
            slot,
            state.load_of(node),
            state.capacity_per_node(),
        ))
    }
}

fn status(node: NodeId, slot: usize, current_load: usize, capacity: u64) -> CapacityStatus {
    let load_percentage = if capacity == 0 {
        0.0
    } else {
        100.0 * current_load as f64 / capacity as f64
    };
    CapacityStatus {
        node,
        slot,
        current_load,
        capacity,
        load_percentage,
        tier: CapacityTier::from_percentage(load_percentage),
    }
}
