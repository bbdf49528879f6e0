//! Assignment service boundary.
//!
//! The service owns the authoritative ring: it decides positions and
//! assignments and reports movement statistics. Every mutating call returns
//! a whole replacement state.

use crate::error::Result;
use crate::wire::{AlgorithmComparison, Operation, WireState};
use async_trait::async_trait;
use ring_layout::{Algorithm, NodeId};

/// Operations exposed by an assignment service.
///
/// # Thread Safety
///
/// Implementations are shared between the session and in-flight requests,
/// so they must be `Send + Sync`.
#[async_trait]
pub trait AssignmentService: Send + Sync + 'static {
    /// Current state without statistics.
    async fn fetch_state(&self) -> Result<WireState>;

    /// Adds one node; the service picks its id.
    async fn add_node(&self) -> Result<WireState>;

    /// Removes a node. Unknown ids are a no-op.
    async fn remove_node(&self, node: &NodeId) -> Result<WireState>;

    /// Replaces every key with `count` fresh ones.
    async fn regenerate_keys(&self, count: usize) -> Result<WireState>;

    /// Grows or truncates the key set to `count` keys.
    async fn set_key_count(&self, count: usize) -> Result<WireState>;

    async fn set_algorithm(&self, algorithm: &Algorithm) -> Result<WireState>;

    /// Sets bounded-load parameters. Only valid under [`Algorithm::BoundedLoad`].
    async fn set_capacity_config(&self, load_factor: f64, expected_keys: u64)
        -> Result<WireState>;

    /// Runs `operation` once per known algorithm without touching the
    /// service's own state.
    async fn compare_operation(
        &self,
        operation: Operation,
        node: Option<&NodeId>,
    ) -> Result<Vec<AlgorithmComparison>>;

    /// Name for logging.
    fn name(&self) -> &'static str;
}
