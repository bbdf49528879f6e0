//! Ring layout and aggregation engine.
//!
//! This crate turns an assignment snapshot produced by a consistent hashing
//! service into renderer-agnostic geometry:
//! - Position mapping (ring position to angle and point)
//! - Ownership segments, with wrap-around splitting
//! - Bucket aggregation for large key sets
//! - Capacity annotation for the bounded-load variant
//! - Tooltip explanations per algorithm
//!
//! The engine is pure. It never hashes keys, never decides assignment and
//! never fails on inconsistent input; anything it cannot place falls back to
//! a default rendering.

pub mod capacity;
pub mod config;
pub mod error;
pub mod explain;
pub mod layout;
pub mod node;
pub mod ring;
pub mod state;

pub use capacity::{CapacityAnnotator, CapacityStatus, CapacityTier};
pub use config::LayoutConfig;
pub use error::{Error, Result};
pub use explain::{Explanation, ExplanationResolver, HoverTarget, Template};
pub use layout::{KeyRendering, Layout, RingLayout, Transition};
pub use node::{Color, KeyId, NodeId};
pub use ring::{Aggregator, Bucket, Point, PositionMapper, Segment, SegmentBuilder};
pub use state::{Algorithm, CapacityConfig, RingState, RingStateBuilder};
