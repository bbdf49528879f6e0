//! Last-snapshot-wins session over an assignment service.
//!
//! Every request is stamped with a generation when it is issued. When a
//! response arrives its layout is computed without holding any lock, then
//! it replaces the current view only if nothing newer was applied in the
//! meantime. Stale responses are dropped whole, never merged.
//!
//! While a request is in flight, and after one fails, the previous snapshot
//! and its layout stay readable.

use crate::error::{Result, SessionError};
use crate::service::AssignmentService;
use crate::stats::StatsSummary;
use crate::wire::{AlgorithmComparison, Operation, Statistics, WireState};
use parking_lot::RwLock;
use ring_layout::{
    Algorithm, Explanation, ExplanationResolver, HoverTarget, KeyId, Layout, NodeId, RingLayout,
    RingState,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to a completed request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The response is now the current view.
    Applied { generation: u64 },
    /// A newer response had already been applied; this one was dropped.
    Superseded { generation: u64, current: u64 },
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

/// The most recent failure, kept until the next successful apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub generation: u64,
    pub message: String,
    pub retryable: bool,
}

/// One consistent snapshot of the session.
///
/// Cheap to clone; the state and layout are shared.
#[derive(Clone, Debug)]
pub struct View {
    pub generation: u64,
    pub state: Arc<RingState>,
    pub layout: Arc<Layout>,
    pub stats: Option<Statistics>,
    pub failure: Option<Failure>,
}

/// Keeps the current snapshot of an [`AssignmentService`] and its layout.
pub struct Session<S> {
    service: Arc<S>,
    engine: RingLayout,
    issued: AtomicU64,
    view: RwLock<View>,
}

impl<S: AssignmentService> Session<S> {
    pub fn new(service: S, engine: RingLayout) -> Self {
        Self::with_shared(Arc::new(service), engine)
    }

    pub fn with_shared(service: Arc<S>, engine: RingLayout) -> Self {
        let state = RingState::builder().build();
        let layout = engine.compute(&state);
        Self {
            service,
            engine,
            issued: AtomicU64::new(0),
            view: RwLock::new(View {
                generation: 0,
                state: Arc::new(state),
                layout: Arc::new(layout),
                stats: None,
                failure: None,
            }),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn engine(&self) -> &RingLayout {
        &self.engine
    }

    /// Stamps a new request. Generations start at 1 and only grow.
    pub fn begin(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Applies a completed response issued as `generation`.
    ///
    /// Any decoded snapshot is accepted; only ordering can drop it.
    pub fn apply(&self, generation: u64, wire: WireState) -> Outcome {
        let current = self.view.read().generation;
        if generation <= current {
            return self.superseded(generation, current);
        }

        let state = wire.to_ring_state();
        let layout = self.engine.compute(&state);

        let mut view = self.view.write();
        if generation <= view.generation {
            let current = view.generation;
            drop(view);
            return self.superseded(generation, current);
        }
        *view = View {
            generation,
            state: Arc::new(state),
            layout: Arc::new(layout),
            stats: wire.stats,
            failure: None,
        };
        drop(view);

        metrics::counter!("ring_session_snapshots_applied_total").increment(1);
        info!(generation, algorithm = %wire.algorithm, "snapshot applied");
        Outcome::Applied { generation }
    }

    fn superseded(&self, generation: u64, current: u64) -> Outcome {
        metrics::counter!("ring_session_snapshots_discarded_total").increment(1);
        debug!(generation, current, "stale snapshot discarded");
        Outcome::Superseded {
            generation,
            current,
        }
    }

    /// Records a failed request. Failures older than the current view are
    /// ignored.
    pub fn fail(&self, generation: u64, err: &SessionError) {
        metrics::counter!("ring_session_service_errors_total").increment(1);
        warn!(generation, error = %err, service = self.service.name(), "request failed");

        let mut view = self.view.write();
        if generation <= view.generation {
            return;
        }
        view.failure = Some(Failure {
            generation,
            message: err.to_string(),
            retryable: err.is_retryable(),
        });
    }

    /// Issues a request and applies its response.
    pub async fn submit<F>(&self, request: F) -> Result<Outcome>
    where
        F: Future<Output = Result<WireState>>,
    {
        let generation = self.begin();
        match request.await {
            Ok(wire) => Ok(self.apply(generation, wire)),
            Err(err) => {
                self.fail(generation, &err);
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Service operations
    // ------------------------------------------------------------------

    pub async fn refresh(&self) -> Result<Outcome> {
        self.submit(self.service.fetch_state()).await
    }

    /// Re-fetches after a failure. Same as [`Session::refresh`].
    pub async fn retry(&self) -> Result<Outcome> {
        self.refresh().await
    }

    pub async fn add_node(&self) -> Result<Outcome> {
        self.submit(self.service.add_node()).await
    }

    pub async fn remove_node(&self, node: &NodeId) -> Result<Outcome> {
        self.submit(self.service.remove_node(node)).await
    }

    pub async fn regenerate_keys(&self, count: usize) -> Result<Outcome> {
        self.submit(self.service.regenerate_keys(count)).await
    }

    pub async fn set_key_count(&self, count: usize) -> Result<Outcome> {
        self.submit(self.service.set_key_count(count)).await
    }

    pub async fn set_algorithm(&self, algorithm: &Algorithm) -> Result<Outcome> {
        self.submit(self.service.set_algorithm(algorithm)).await
    }

    pub async fn set_capacity_config(&self, load_factor: f64, expected_keys: u64) -> Result<Outcome> {
        self.submit(self.service.set_capacity_config(load_factor, expected_keys))
            .await
    }

    /// Runs `operation` under every algorithm. Leaves the view untouched.
    pub async fn compare(
        &self,
        operation: Operation,
        node: Option<&NodeId>,
    ) -> Result<Vec<AlgorithmComparison>> {
        self.service
            .compare_operation(operation, node)
            .await
            .inspect_err(|err| {
                metrics::counter!("ring_session_service_errors_total").increment(1);
                warn!(%operation, error = %err, "comparison failed");
            })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn view(&self) -> View {
        self.view.read().clone()
    }

    pub fn state(&self) -> Arc<RingState> {
        self.view.read().state.clone()
    }

    pub fn layout(&self) -> Arc<Layout> {
        self.view.read().layout.clone()
    }

    /// Generation of the current view; 0 before anything was applied.
    pub fn generation(&self) -> u64 {
        self.view.read().generation
    }

    pub fn stats(&self) -> Option<Statistics> {
        self.view.read().stats.clone()
    }

    pub fn summary(&self) -> Option<StatsSummary> {
        self.view.read().stats.as_ref().map(StatsSummary::from_statistics)
    }

    pub fn failure(&self) -> Option<Failure> {
        self.view.read().failure.clone()
    }

    /// Explanation for a hovered node or key of the current view.
    ///
    /// `None` when the target isn't part of the current snapshot.
    pub fn explain(&self, target: HoverTarget<'_>) -> Option<Explanation> {
        match target {
            HoverTarget::Node(node) => self.explain_node(node),
            HoverTarget::Key(key) => self.explain_key(key),
        }
    }

    pub fn explain_node(&self, node: &NodeId) -> Option<Explanation> {
        let view = self.view.read();
        view.state.slot_of(node.as_str())?;
        Some(ExplanationResolver::explain_node(&view.state, node))
    }

    pub fn explain_key(&self, key: &KeyId) -> Option<Explanation> {
        let view = self.view.read();
        if !view.state.keys().contains(key) {
            return None;
        }
        let capacity = view
            .state
            .assigned_node(key)
            .and_then(|owner| view.layout.capacity_for(owner));
        Some(ExplanationResolver::explain_key(&view.state, key, capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalService;

    fn wire(nodes: &[&str]) -> WireState {
        WireState {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            algorithm: "ring".into(),
            ..WireState::default()
        }
    }

    fn session() -> Session<LocalService> {
        Session::new(LocalService::new(), RingLayout::default())
    }

    #[test]
    fn test_generations_increase() {
        let session = session();
        assert_eq!(session.begin(), 1);
        assert_eq!(session.begin(), 2);
        assert_eq!(session.generation(), 0);
    }

    #[test]
    fn test_stale_response_discarded() {
        let session = session();
        let first = session.begin();
        let second = session.begin();

        let outcome = session.apply(second, wire(&["b0", "b1"]));
        assert_eq!(outcome, Outcome::Applied { generation: second });

        let outcome = session.apply(first, wire(&["a0"]));
        assert_eq!(
            outcome,
            Outcome::Superseded {
                generation: first,
                current: second
            }
        );
        assert_eq!(session.state().nodes().len(), 2);
        assert_eq!(session.generation(), second);
    }

    #[test]
    fn test_failure_keeps_last_snapshot() {
        let session = session();
        let generation = session.begin();
        session.apply(generation, wire(&["n0"]));

        let failed = session.begin();
        session.fail(failed, &SessionError::Transport("refused".into()));

        let failure = session.failure().unwrap();
        assert!(failure.retryable);
        assert_eq!(failure.generation, failed);
        assert_eq!(session.state().nodes().len(), 1);

        let next = session.begin();
        session.apply(next, wire(&["n0", "n1"]));
        assert!(session.failure().is_none());
    }

    #[test]
    fn test_stale_failure_ignored() {
        let session = session();
        let old = session.begin();
        let new = session.begin();
        session.apply(new, wire(&["n0"]));
        session.fail(old, &SessionError::Transport("late".into()));
        assert!(session.failure().is_none());
    }

    #[test]
    fn test_small_load_factor_snapshot_applies() {
        let session = session();
        let mut low = wire(&["n0", "n1", "n2"]);
        low.algorithm = "chbl".into();
        low.chbl_config = Some(crate::wire::WireCapacityConfig {
            load_factor: 0.8,
            expected_keys: 30,
            capacity_per_node: 8,
        });
        let generation = session.begin();
        assert!(session.apply(generation, low).is_applied());
        assert!(session.failure().is_none());
        assert_eq!(session.generation(), generation);
        assert_eq!(session.layout().capacity.len(), 3);

        // the next snapshot still goes through
        let next = session.begin();
        assert!(session.apply(next, wire(&["n0"])).is_applied());
        assert_eq!(session.state().nodes().len(), 1);
    }

    #[tokio::test]
    async fn test_explain_targets() {
        let session = session();
        session.refresh().await.unwrap();

        let explanation = session.explain_node(&NodeId::from("node-0")).unwrap();
        assert_eq!(explanation.title, "Node: node-0");
        assert!(session.explain_node(&NodeId::from("node-42")).is_none());

        let explanation = session.explain(HoverTarget::Key(&KeyId::from("key-3"))).unwrap();
        assert_eq!(explanation.title, "Key: key-3");
        assert!(session.explain_key(&KeyId::from("key-999")).is_none());
    }
}
