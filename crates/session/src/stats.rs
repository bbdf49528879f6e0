//! Presentation summaries of movement statistics.
//!
//! Everything here is derived from the service's statistics payload alone.
//! Churn is never recomputed by diffing snapshots.

use crate::wire::{AlgorithmComparison, KeyMovement, Statistics};
use ring_layout::{Algorithm, CapacityTier};
use serde::Serialize;
use std::fmt;

/// Current vs previous key count for one node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DistributionRow {
    pub node: String,
    pub current: usize,
    pub previous: usize,
    pub change: i64,
    /// Relative change; `None` when the node previously held no keys.
    pub change_percent: Option<f64>,
}

/// Keys a node received (moved in or newly placed).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReceivedRow {
    pub node: String,
    pub keys: usize,
    /// Share of all moved keys, in percent.
    pub share_percent: f64,
}

/// Bounded-load capacity line for one node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CapacityRow {
    pub node: String,
    pub load: usize,
    pub capacity: u64,
    pub load_percentage: f64,
    pub tier: CapacityTier,
    pub at_capacity: bool,
}

/// Bounded-load capacity report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CapacitySummary {
    pub unassigned_keys: usize,
    pub nodes_at_capacity: Vec<String>,
    pub rows: Vec<CapacityRow>,
}

impl CapacitySummary {
    /// Warning shown when keys were left without a node.
    pub fn shortfall(&self) -> Option<String> {
        if self.unassigned_keys == 0 {
            return None;
        }
        Some(format!(
            "{} keys could not be assigned because all nodes are at capacity. \
             Increase expected keys or load factor.",
            self.unassigned_keys
        ))
    }
}

/// Everything a stats panel shows for one operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsSummary {
    pub title: String,
    pub total_keys: usize,
    pub keys_moved: usize,
    pub keys_moved_percent: f64,
    pub distribution: Vec<DistributionRow>,
    /// Sorted by key count, largest first. Empty when nothing moved.
    pub received: Vec<ReceivedRow>,
    /// The service's movement list; may be shorter than `keys_moved`.
    pub movements: Vec<KeyMovement>,
    pub capacity: Option<CapacitySummary>,
}

impl StatsSummary {
    pub fn from_statistics(stats: &Statistics) -> Self {
        let distribution = stats
            .distribution
            .iter()
            .map(|(node, &current)| {
                let previous = stats.previous_dist.get(node).copied().unwrap_or(0);
                let change = current as i64 - previous as i64;
                let change_percent = if previous > 0 {
                    Some(change as f64 / previous as f64 * 100.0)
                } else {
                    None
                };
                DistributionRow {
                    node: node.clone(),
                    current,
                    previous,
                    change,
                    change_percent,
                }
            })
            .collect();

        let mut received: Vec<ReceivedRow> = if stats.keys_moved > 0 {
            stats
                .movement_by_node
                .iter()
                .map(|(node, &keys)| ReceivedRow {
                    node: node.clone(),
                    keys,
                    share_percent: keys as f64 / stats.keys_moved as f64 * 100.0,
                })
                .collect()
        } else {
            Vec::new()
        };
        // stable sort keeps node order among ties
        received.sort_by(|a, b| b.keys.cmp(&a.keys));

        let capacity = stats.capacity_info.as_ref().map(|info| CapacitySummary {
            unassigned_keys: info.unassigned_keys,
            nodes_at_capacity: info.nodes_at_capacity.clone(),
            rows: info
                .capacity_per_node
                .iter()
                .map(|(node, &capacity)| {
                    let load_percentage = info.load_percentage.get(node).copied().unwrap_or(0.0);
                    CapacityRow {
                        node: node.clone(),
                        load: info.current_load.get(node).copied().unwrap_or(0),
                        capacity,
                        load_percentage,
                        tier: CapacityTier::from_percentage(load_percentage),
                        at_capacity: info.nodes_at_capacity.contains(node),
                    }
                })
                .collect(),
        });

        Self {
            title: stats.operation_label().to_string(),
            total_keys: stats.total_keys,
            keys_moved: stats.keys_moved,
            keys_moved_percent: stats.keys_moved_percent,
            distribution,
            received,
            movements: stats.key_movements.clone(),
            capacity,
        }
    }

    /// True when the movement list was cut short by the service.
    pub fn movements_truncated(&self) -> bool {
        self.movements.len() < self.keys_moved
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(
            f,
            "  total keys: {}  moved: {} ({:.2}%)",
            self.total_keys, self.keys_moved, self.keys_moved_percent
        )?;

        writeln!(f, "  distribution:")?;
        for row in &self.distribution {
            let change = match (row.change, row.change_percent) {
                (0, _) => "no change".to_string(),
                (change, Some(percent)) => format!("{:+} ({:.1}%)", change, percent),
                (change, None) => format!("{:+} (new)", change),
            };
            writeln!(
                f,
                "    {:<10} {:>5} <- {:<5} {}",
                row.node, row.current, row.previous, change
            )?;
        }

        if !self.received.is_empty() {
            writeln!(f, "  keys received:")?;
            for row in &self.received {
                writeln!(f, "    {:<10} {:>5} ({:.1}%)", row.node, row.keys, row.share_percent)?;
            }
        }

        if !self.movements.is_empty() {
            if self.movements_truncated() {
                writeln!(
                    f,
                    "  movements (first {} of {}):",
                    self.movements.len(),
                    self.keys_moved
                )?;
            } else {
                writeln!(f, "  movements:")?;
            }
            for movement in &self.movements {
                writeln!(
                    f,
                    "    {} : {} -> {}",
                    movement.key_id, movement.from_node, movement.to_node
                )?;
            }
        }

        if let Some(capacity) = &self.capacity {
            if let Some(warning) = capacity.shortfall() {
                writeln!(f, "  warning: {}", warning)?;
            }
            writeln!(f, "  capacity:")?;
            for row in &capacity.rows {
                writeln!(
                    f,
                    "    {:<10} {}/{} ({:.1}%){}",
                    row.node,
                    row.load,
                    row.capacity,
                    row.load_percentage,
                    if row.at_capacity { " AT CAPACITY" } else { "" }
                )?;
            }
        }
        Ok(())
    }
}

/// Churn of one algorithm in a side-by-side comparison.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub algorithm: Algorithm,
    pub keys_moved: usize,
    pub churn_percent: f64,
    pub nodes: usize,
}

impl ComparisonRow {
    /// One row per comparison, in service order.
    pub fn from_comparisons(comparisons: &[AlgorithmComparison]) -> Vec<Self> {
        comparisons
            .iter()
            .map(|comparison| {
                let (keys_moved, churn_percent) = comparison
                    .stats
                    .as_ref()
                    .map(|stats| (stats.keys_moved, stats.keys_moved_percent))
                    .unwrap_or((0, 0.0));
                ComparisonRow {
                    algorithm: Algorithm::from(comparison.algorithm.clone()),
                    keys_moved,
                    churn_percent,
                    nodes: comparison.state.nodes.len(),
                }
            })
            .collect()
    }
}
