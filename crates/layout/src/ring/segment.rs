//! Ownership segments.
//!
//! A segment is the arc drawn under a node's keys: from the first to the
//! last of its key positions. It is a visual approximation of ownership, not
//! the ring-walk boundary. The assignment map stays authoritative, and no
//! vnode boundaries cross the service interface anyway.
//!
//! # Wrap-around
//!
//! Sorting a node's key positions loses the circular order. The arc that
//! actually holds the keys is the circle minus its largest empty gap:
//!
//! ```text
//!   sorted: 0.02 0.05 | 0.95 0.98      gaps: 0.03, 0.90, 0.03, wrap 0.04
//!                     ^ largest gap is internal -> arc crosses 0
//!   segments: [0, 0.05] and [0.95, 1)
//! ```
//!
//! When the largest gap is the wrap gap (`1 - max + min`) the arc is the
//! plain `[min, max]`. Ties go to the wrap gap, so an arc is split only when
//! crossing 0 is strictly shorter.

use super::position::{clockwise_gap, PositionMapper, TAU};
use crate::node::{KeyId, NodeId};
use crate::state::RingState;
use serde::Serialize;

/// Angular range attributed to one node.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Segment {
    /// Owning node.
    pub owner: NodeId,
    /// Slot of the owning node in the snapshot.
    pub slot: usize,
    /// Start angle in radians, in `[0, 2π)`.
    pub start_angle: f64,
    /// End angle in radians. Equals `2π` only for the piece that closes at
    /// the wrap point.
    pub end_angle: f64,
    /// Keys inside this arc, in ascending position order.
    pub member_keys: Vec<KeyId>,
    /// Set on both pieces of an arc that was split at 0.
    pub wrapped: bool,
}

impl Segment {
    /// Angular width of the arc.
    pub fn span(&self) -> f64 {
        self.end_angle - self.start_angle
    }
}

/// Where a node's keys sit on the ring.
#[derive(Copy, Clone, PartialEq, Debug)]
enum OwnedArc {
    /// `[start, end]` without crossing 0.
    Contiguous { start: f64, end: f64 },
    /// Crosses 0: keys up to index `split` form `[0, low_end]`, the rest
    /// form `[high_start, 1)`.
    Wrapped {
        split: usize,
        low_end: f64,
        high_start: f64,
    },
}

/// Builds ownership segments from a snapshot.
pub struct SegmentBuilder;

impl SegmentBuilder {
    /// Computes every node's segments.
    ///
    /// Nodes without keys produce none. Keys with no valid owner are
    /// skipped. Output follows node order, low piece first for split arcs.
    pub fn build(state: &RingState) -> Vec<Segment> {
        let mut members: Vec<Vec<(f64, &KeyId)>> = vec![Vec::new(); state.nodes().len()];
        for key in state.keys() {
            if let Some(slot) = state.assigned_slot(key) {
                members[slot].push((state.key_position(key), key));
            }
        }

        let mut segments = Vec::new();
        for (slot, mut keys) in members.into_iter().enumerate() {
            if keys.is_empty() {
                continue;
            }
            keys.sort_by(|a, b| a.0.total_cmp(&b.0));
            let owner = &state.nodes()[slot];
            Self::push_segments(&mut segments, owner, slot, &keys);
        }
        segments
    }

    fn push_segments(out: &mut Vec<Segment>, owner: &NodeId, slot: usize, keys: &[(f64, &KeyId)]) {
        match owned_arc(keys) {
            OwnedArc::Contiguous { start, end } => out.push(Segment {
                owner: owner.clone(),
                slot,
                start_angle: PositionMapper::angle(start),
                end_angle: PositionMapper::angle(end),
                member_keys: key_ids(keys),
                wrapped: false,
            }),
            OwnedArc::Wrapped {
                split,
                low_end,
                high_start,
            } => {
                out.push(Segment {
                    owner: owner.clone(),
                    slot,
                    start_angle: 0.0,
                    end_angle: PositionMapper::angle(low_end),
                    member_keys: key_ids(&keys[..=split]),
                    wrapped: true,
                });
                out.push(Segment {
                    owner: owner.clone(),
                    slot,
                    start_angle: PositionMapper::angle(high_start),
                    end_angle: TAU,
                    member_keys: key_ids(&keys[split + 1..]),
                    wrapped: true,
                });
            }
        }
    }
}

fn key_ids(keys: &[(f64, &KeyId)]) -> Vec<KeyId> {
    keys.iter().map(|(_, key)| (*key).clone()).collect()
}

/// Finds the arc covering `keys`, which must be non-empty and sorted.
fn owned_arc(keys: &[(f64, &KeyId)]) -> OwnedArc {
    let first = keys[0].0;
    let last = keys[keys.len() - 1].0;
    let contiguous = OwnedArc::Contiguous {
        start: first,
        end: last,
    };
    if keys.len() == 1 {
        return contiguous;
    }

    let wrap_gap = 1.0 - last + first;
    let widest = keys
        .windows(2)
        .enumerate()
        .map(|(i, pair)| (i, clockwise_gap(pair[0].0, pair[1].0)))
        .fold(None, |best: Option<(usize, f64)>, (i, gap)| match best {
            Some((_, widest)) if widest >= gap => best,
            _ => Some((i, gap)),
        });

    match widest {
        Some((split, gap)) if gap > wrap_gap => OwnedArc::Wrapped {
            split,
            low_end: keys[split].0,
            high_start: keys[split + 1].0,
        },
        _ => contiguous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_node(positions: &[f64]) -> RingState {
        let mut builder = RingState::builder().node("n0");
        for (i, p) in positions.iter().enumerate() {
            builder = builder.key(format!("k{}", i), *p, "n0");
        }
        builder.build()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_clustered_keys_one_segment() {
        let state = single_node(&[0.15, 0.1, 0.2, 0.12]);
        let segments = SegmentBuilder::build(&state);

        assert_eq!(segments.len(), 1);
        assert_close(segments[0].start_angle, TAU * 0.1);
        assert_close(segments[0].end_angle, TAU * 0.2);
        assert_eq!(segments[0].member_keys.len(), 4);
        assert!(!segments[0].wrapped);
    }

    #[test]
    fn test_wrapping_keys_split() {
        let state = single_node(&[0.95, 0.98, 0.02, 0.05]);
        let segments = SegmentBuilder::build(&state);

        assert_eq!(segments.len(), 2);
        let low = &segments[0];
        assert_eq!(low.start_angle, 0.0);
        assert_close(low.end_angle, TAU * 0.05);
        assert_eq!(low.member_keys, vec![KeyId::from("k2"), KeyId::from("k3")]);

        let high = &segments[1];
        assert_close(high.start_angle, TAU * 0.95);
        assert_eq!(high.end_angle, TAU);
        assert_eq!(high.member_keys, vec![KeyId::from("k0"), KeyId::from("k1")]);
        assert!(low.wrapped && high.wrapped);
    }

    #[test]
    fn test_arc_starting_at_zero_is_not_wrapped() {
        let state = single_node(&[0.0, 0.1, 0.2]);
        let segments = SegmentBuilder::build(&state);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_angle, 0.0);
        assert!(!segments[0].wrapped);
    }

    #[test]
    fn test_single_key_is_a_point() {
        let state = single_node(&[0.4]);
        let segments = SegmentBuilder::build(&state);

        assert_eq!(segments.len(), 1);
        assert_close(segments[0].span(), 0.0);
    }

    #[test]
    fn test_tied_gaps_stay_unwrapped() {
        // internal gap 0.5 equals wrap gap 0.5
        let state = single_node(&[0.25, 0.75]);
        let segments = SegmentBuilder::build(&state);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_keyless_node_has_no_segment() {
        let state = RingState::builder()
            .nodes(["n0", "n1"])
            .key("k0", 0.3, "n0")
            .build();
        let segments = SegmentBuilder::build(&state);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].owner, NodeId::from("n0"));
    }

    #[test]
    fn test_dangling_keys_skipped() {
        let state = RingState::builder()
            .node("n0")
            .key("k0", 0.3, "n0")
            .key("k1", 0.6, "ghost")
            .build();
        let segments = SegmentBuilder::build(&state);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].member_keys, vec![KeyId::from("k0")]);
    }
}
