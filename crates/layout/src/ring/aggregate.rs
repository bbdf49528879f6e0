//! Bucket aggregation for large key sets.
//!
//! Past [`AGGREGATION_THRESHOLD`] keys, drawing one marker per key stops
//! scaling. The circle is cut into [`BUCKET_COUNT`] equal slots and each
//! non-empty slot is drawn once, sized by how many keys fell into it.
//!
//! Bucket `i` is centered at `2π·i/B` and holds the keys whose angle is
//! within half a bucket width of that center. A key exactly on the border
//! between two buckets goes to the higher index, so every key lands in
//! exactly one bucket.

use super::position::{normalize_angle, PositionMapper, TAU};
use crate::node::NodeId;
use crate::state::RingState;
use serde::Serialize;

/// Number of angular buckets.
pub const BUCKET_COUNT: usize = 360;

/// Aggregation kicks in strictly above this many keys.
pub const AGGREGATION_THRESHOLD: usize = 50;

/// Width of one bucket in radians.
pub const BUCKET_WIDTH: f64 = TAU / BUCKET_COUNT as f64;

/// One non-empty angular slot.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Bucket {
    /// Slot index in `[0, BUCKET_COUNT)`.
    pub index: usize,
    /// Owner of the first key (in snapshot order) that fell in this bucket.
    /// `None` when that key is unassigned or points at an unknown node.
    pub representative: Option<NodeId>,
    /// Slot of the representative node.
    pub representative_slot: Option<usize>,
    /// Number of keys in the bucket.
    pub member_count: usize,
}

impl Bucket {
    /// Angle of the bucket center.
    pub fn center_angle(&self) -> f64 {
        TAU * self.index as f64 / BUCKET_COUNT as f64
    }

    /// Density in `[0, 1]`, saturating at 20 keys.
    pub fn intensity(&self) -> f64 {
        (self.member_count as f64 / 20.0).min(1.0)
    }

    /// Marker radius, between 3 and 8.
    pub fn marker_radius(&self) -> f64 {
        (self.member_count as f64 / 5.0).clamp(3.0, 8.0)
    }
}

/// Reduces per-key rendering to per-bucket rendering.
#[derive(Copy, Clone, Debug)]
pub struct Aggregator {
    threshold: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AGGREGATION_THRESHOLD)
    }
}

impl Aggregator {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// True when `key_count` keys should be drawn as buckets.
    pub fn engages(&self, key_count: usize) -> bool {
        key_count > self.threshold
    }

    /// Bucket index for an angle.
    pub fn bucket_of(angle: f64) -> usize {
        let shifted = normalize_angle(angle + BUCKET_WIDTH / 2.0);
        (shifted / BUCKET_WIDTH).floor() as usize % BUCKET_COUNT
    }

    /// Buckets for the snapshot, or `None` below the threshold.
    pub fn aggregate(&self, state: &RingState) -> Option<Vec<Bucket>> {
        if !self.engages(state.keys().len()) {
            return None;
        }
        Some(Self::buckets(state))
    }

    /// Unconditionally buckets every key. Non-empty buckets only, by index.
    pub fn buckets(state: &RingState) -> Vec<Bucket> {
        let mut counts = [0usize; BUCKET_COUNT];
        let mut representatives: [Option<usize>; BUCKET_COUNT] = [None; BUCKET_COUNT];

        for key in state.keys() {
            let index = Self::bucket_of(PositionMapper::angle(state.key_position(key)));
            if counts[index] == 0 {
                representatives[index] = state.assigned_slot(key);
            }
            counts[index] += 1;
        }

        counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(index, count)| {
                let slot = representatives[index];
                Bucket {
                    index,
                    representative: slot.map(|s| state.nodes()[s].clone()),
                    representative_slot: slot,
                    member_count: *count,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_state(key_count: usize) -> RingState {
        let mut builder = RingState::builder().nodes(["n0", "n1", "n2"]);
        for i in 0..key_count {
            let position = i as f64 / key_count as f64;
            builder = builder.key(format!("key-{}", i), position, format!("n{}", i % 3));
        }
        builder.build()
    }

    #[test]
    fn test_threshold_boundary() {
        let aggregator = Aggregator::default();
        assert!(aggregator.aggregate(&uniform_state(50)).is_none());
        assert!(aggregator.aggregate(&uniform_state(51)).is_some());
    }

    #[test]
    fn test_bucket_of_centers_and_borders() {
        assert_eq!(Aggregator::bucket_of(0.0), 0);
        assert_eq!(Aggregator::bucket_of(BUCKET_WIDTH), 1);
        // just below center 0, across the wrap
        assert_eq!(Aggregator::bucket_of(TAU - BUCKET_WIDTH * 0.25), 0);
        // the border between 0 and 1 goes to 1
        assert_eq!(Aggregator::bucket_of(BUCKET_WIDTH * 0.5), 1);
        assert_eq!(Aggregator::bucket_of(BUCKET_WIDTH * 0.49), 0);
    }

    #[test]
    fn test_conservation() {
        let state = uniform_state(1000);
        let buckets = Aggregator::default().aggregate(&state).unwrap();
        let total: usize = buckets.iter().map(|b| b.member_count).sum();
        assert_eq!(total, 1000);
    }

    #[test]
    fn test_representative_is_first_key() {
        let mut builder = RingState::builder().nodes(["n0", "n1"]);
        builder = builder.key("a", 0.5, "n1").key("b", 0.5, "n0");
        for i in 0..60 {
            builder = builder.key(format!("fill-{}", i), 0.1, "n0");
        }
        let state = builder.build();
        let buckets = Aggregator::default().aggregate(&state).unwrap();

        let half = buckets.iter().find(|b| b.index == 180).unwrap();
        assert_eq!(half.member_count, 2);
        assert_eq!(half.representative, Some(NodeId::from("n1")));
        assert_eq!(half.representative_slot, Some(1));
    }

    #[test]
    fn test_dangling_representative() {
        let mut builder = RingState::builder().node("n0").key("lost", 0.75, "ghost");
        for i in 0..60 {
            builder = builder.key(format!("k{}", i), 0.25, "n0");
        }
        let buckets = Aggregator::buckets(&builder.build());
        let lost = buckets.iter().find(|b| b.index == 270).unwrap();
        assert_eq!(lost.representative, None);
        assert_eq!(lost.representative_slot, None);
    }

    #[test]
    fn test_marker_sizing() {
        let bucket = |member_count| Bucket {
            index: 0,
            representative: None,
            representative_slot: None,
            member_count,
        };
        assert_eq!(bucket(1).marker_radius(), 3.0);
        assert_eq!(bucket(100).marker_radius(), 8.0);
        assert_eq!(bucket(10).intensity(), 0.5);
    }
}
