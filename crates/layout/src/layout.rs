//! Full ring layout for one snapshot.
//!
//! [`RingLayout::compute`] runs position mapping, segment building,
//! aggregation and capacity annotation and returns plain descriptor records.
//! Renderers draw them however they like; nothing here knows about a
//! display surface.

use crate::capacity::{CapacityAnnotator, CapacityStatus};
use crate::config::LayoutConfig;
use crate::node::{Color, KeyId, NodeId};
use crate::ring::aggregate::{Aggregator, Bucket};
use crate::ring::position::{Point, PositionMapper};
use crate::ring::segment::{Segment, SegmentBuilder};
use crate::state::RingState;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Ring positions that get a percentage marker.
const MARKER_POSITIONS: [f64; 4] = [0.0, 0.25, 0.5, 0.75];

/// Half the thickness of a segment band.
const SEGMENT_HALF_WIDTH: f64 = 5.0;

/// Animation hint. Renderers may honor or ignore it.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Transition {
    pub duration_ms: u64,
}

impl Transition {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Where a node is drawn.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct NodePlacement {
    pub id: NodeId,
    pub slot: usize,
    pub angle: f64,
    pub point: Point,
    pub color: Color,
    pub key_count: usize,
}

/// Where an individual key is drawn.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct KeyPlacement {
    pub id: KeyId,
    pub position: f64,
    pub angle: f64,
    pub point: Point,
    /// Owner slot, `None` for unassigned or dangling keys.
    pub slot: Option<usize>,
    pub color: Color,
    pub transition: Transition,
}

/// A drawable ownership band.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct SegmentArc {
    pub segment: Segment,
    pub color: Color,
    pub inner_radius: f64,
    pub outer_radius: f64,
}

/// A drawable bucket marker.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct BucketMarker {
    pub bucket: Bucket,
    pub point: Point,
    pub color: Color,
    pub radius: f64,
    pub opacity: f64,
    /// Representative node's position, for the faint connector line.
    pub node_point: Option<Point>,
}

/// Percentage tick on the node ring.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct RingMarker {
    pub position: f64,
    pub label: String,
    pub inner: Point,
    pub outer: Point,
}

/// Keys are either drawn one by one or as buckets.
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(tag = "mode", content = "items", rename_all = "lowercase")]
pub enum KeyRendering {
    Individual(Vec<KeyPlacement>),
    Aggregated(Vec<BucketMarker>),
}

impl KeyRendering {
    pub fn is_aggregated(&self) -> bool {
        matches!(self, KeyRendering::Aggregated(_))
    }

    /// Number of drawn items (keys or buckets).
    pub fn len(&self) -> usize {
        match self {
            KeyRendering::Individual(keys) => keys.len(),
            KeyRendering::Aggregated(buckets) => buckets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a renderer needs for one snapshot.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Layout {
    pub center: Point,
    pub radius: f64,
    pub key_radius: f64,
    pub markers: Vec<RingMarker>,
    pub nodes: Vec<NodePlacement>,
    pub segments: Vec<SegmentArc>,
    pub keys: KeyRendering,
    /// Empty unless the snapshot is bounded-load with a capacity config.
    pub capacity: Vec<CapacityStatus>,
    pub capacity_transition: Transition,
}

impl Layout {
    pub fn node(&self, id: &NodeId) -> Option<&NodePlacement> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn capacity_for(&self, id: &NodeId) -> Option<&CapacityStatus> {
        self.capacity.iter().find(|c| &c.node == id)
    }
}

/// Layout engine.
#[derive(Clone, Debug, Default)]
pub struct RingLayout {
    config: LayoutConfig,
}

impl RingLayout {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Computes the layout for a snapshot. Never fails.
    pub fn compute(&self, state: &RingState) -> Layout {
        let mapper = PositionMapper::new(self.config.center());
        let radius = self.config.radius();
        let key_radius = self.config.key_radius();
        let loads = state.loads();

        let nodes: Vec<NodePlacement> = state
            .nodes()
            .iter()
            .enumerate()
            .map(|(slot, id)| {
                let angle = state.node_angle(id);
                NodePlacement {
                    id: id.clone(),
                    slot,
                    angle,
                    point: mapper.point_at_angle(angle, radius),
                    color: Color::for_slot(Some(slot)),
                    key_count: loads[slot],
                }
            })
            .collect();

        let segments = SegmentBuilder::build(state)
            .into_iter()
            .map(|segment| SegmentArc {
                color: Color::for_slot(Some(segment.slot)),
                segment,
                inner_radius: key_radius - SEGMENT_HALF_WIDTH,
                outer_radius: key_radius + SEGMENT_HALF_WIDTH,
            })
            .collect::<Vec<_>>();

        let aggregator = Aggregator::new(self.config.aggregation_threshold);
        let keys = match aggregator.aggregate(state) {
            Some(buckets) => KeyRendering::Aggregated(
                buckets
                    .into_iter()
                    .map(|bucket| self.bucket_marker(&mapper, &nodes, key_radius, bucket))
                    .collect(),
            ),
            None => KeyRendering::Individual(self.key_placements(state, &mapper, key_radius)),
        };

        let capacity = CapacityAnnotator::annotate(state);

        let markers = MARKER_POSITIONS
            .iter()
            .map(|&position| RingMarker {
                position,
                label: format!("{:.0}%", position * 100.0),
                inner: mapper.point(position, radius),
                outer: mapper.point(position, radius + 15.0),
            })
            .collect();

        debug!(
            nodes = nodes.len(),
            keys = state.keys().len(),
            segments = segments.len(),
            aggregated = keys.is_aggregated(),
            algorithm = %state.algorithm(),
            "computed ring layout"
        );
        metrics::counter!("ring_layout_recomputations_total").increment(1);

        Layout {
            center: mapper.center(),
            radius,
            key_radius,
            markers,
            nodes,
            segments,
            keys,
            capacity,
            capacity_transition: Transition {
                duration_ms: self.config.capacity_transition_ms,
            },
        }
    }

    fn key_placements(
        &self,
        state: &RingState,
        mapper: &PositionMapper,
        key_radius: f64,
    ) -> Vec<KeyPlacement> {
        let transition = Transition {
            duration_ms: self.config.key_transition_ms,
        };
        state
            .keys()
            .iter()
            .map(|key| {
                let position = state.key_position(key);
                let slot = state.assigned_slot(key);
                KeyPlacement {
                    id: key.clone(),
                    position,
                    angle: PositionMapper::angle(position),
                    point: mapper.point(position, key_radius),
                    slot,
                    color: Color::for_slot(slot),
                    transition,
                }
            })
            .collect()
    }

    fn bucket_marker(
        &self,
        mapper: &PositionMapper,
        nodes: &[NodePlacement],
        key_radius: f64,
        bucket: Bucket,
    ) -> BucketMarker {
        let slot = bucket.representative_slot;
        BucketMarker {
            point: mapper.point_at_angle(bucket.center_angle(), key_radius),
            color: Color::for_slot(slot),
            radius: bucket.marker_radius(),
            opacity: 0.6 + bucket.intensity() * 0.4,
            node_point: slot.map(|s| nodes[s].point),
            bucket,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Algorithm, CapacityConfig};

    #[test]
    fn test_individual_mode_positions() {
        let state = RingState::builder()
            .node("n0")
            .node_angle("n0", 0.0)
            .key("k0", 0.25, "n0")
            .build();
        let layout = RingLayout::default().compute(&state);

        let KeyRendering::Individual(keys) = &layout.keys else {
            panic!("expected individual keys");
        };
        assert_eq!(keys.len(), 1);
        assert!((keys[0].point.x - 400.0).abs() < 1e-9);
        assert!((keys[0].point.y - (300.0 + layout.key_radius)).abs() < 1e-9);
        assert_eq!(keys[0].transition.duration(), Duration::from_millis(800));
        assert_eq!(layout.nodes[0].key_count, 1);
    }

    #[test]
    fn test_markers() {
        let layout = RingLayout::default().compute(&RingState::builder().build());
        let labels: Vec<&str> = layout.markers.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, ["0%", "25%", "50%", "75%"]);
        assert!(layout.nodes.is_empty());
        assert!(layout.keys.is_empty());
    }

    #[test]
    fn test_aggregated_markers_link_to_nodes() {
        let mut builder = RingState::builder().nodes(["n0", "n1"]);
        for i in 0..100 {
            builder = builder.key(format!("k{}", i), i as f64 / 100.0, "n1");
        }
        let layout = RingLayout::default().compute(&builder.build());

        let KeyRendering::Aggregated(buckets) = &layout.keys else {
            panic!("expected buckets");
        };
        assert_eq!(buckets.len(), 100);
        let n1 = layout.node(&NodeId::from("n1")).unwrap().point;
        assert!(buckets.iter().all(|b| b.node_point == Some(n1)));
        assert!(buckets.iter().all(|b| b.color == Color::for_slot(Some(1))));
    }

    #[test]
    fn test_capacity_attached_for_bounded_load() {
        let state = RingState::builder()
            .nodes(["n0", "n1"])
            .key("k0", 0.1, "n0")
            .algorithm(Algorithm::BoundedLoad)
            .capacity(CapacityConfig::new(1.0, 2).unwrap())
            .build();
        let layout = RingLayout::default().compute(&state);

        assert_eq!(layout.capacity.len(), 2);
        let n0 = layout.capacity_for(&NodeId::from("n0")).unwrap();
        assert_eq!(n0.load_percentage, 100.0);
        assert_eq!(layout.capacity_transition.duration_ms, 500);
    }

    #[test]
    fn test_layout_serializes() {
        let state = RingState::builder().node("n0").key("k0", 0.5, "n0").build();
        let json = serde_json::to_value(RingLayout::default().compute(&state)).unwrap();
        assert_eq!(json["keys"]["mode"], "individual");
        assert_eq!(json["nodes"][0]["color"], "#4285f4");
    }
}
