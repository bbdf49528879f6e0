//! Ring geometry.
//!
//! Position mapping, ownership segments and bucket aggregation. Everything
//! here works on the circular `[0, 1)` domain and converts to radians only
//! at the edges.

pub mod aggregate;
pub mod position;
pub mod segment;

pub use aggregate::{Aggregator, Bucket, AGGREGATION_THRESHOLD, BUCKET_COUNT};
pub use position::{Point, PositionMapper};
pub use segment::{Segment, SegmentBuilder};
