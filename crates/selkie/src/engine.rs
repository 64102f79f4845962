//! The layout engine: host-side protocol against the computation worker.
//!
//! Fire-and-forget request/response, correlated by a strictly increasing
//! request id. A superseded computation is never interrupted; its response
//! is simply discarded on arrival. All pin/drag checks happen against live
//! state at apply time, never against the state captured at dispatch time.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Instant;

use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};
use selkie_core::graph::{Edge, LayoutConfig, LayoutRequest, LayoutResponse, Node, NodeId};
use selkie_core::rng::{XorShift64Star, seed_for_id};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::scheduler::{DispatchPlan, Scheduler};

/// Jitter half-width, in pixels, when seeding a newly inserted node.
const NEW_NODE_JITTER: f64 = 24.0;

/// Receives position write-backs; the engine never owns node storage.
pub trait PositionSink {
    fn apply(&mut self, id: &str, x: f64, y: f64);
}

impl<F: FnMut(&str, f64, f64)> PositionSink for F {
    fn apply(&mut self, id: &str, x: f64, y: f64) {
        self(id, x, y)
    }
}

/// Transport seam between the engine and the computation unit. The protocol
/// only requires monotonic ids plus discard-on-mismatch; the transport is
/// swappable (tests drive the engine with an inline fake).
pub trait LayoutBackend {
    fn submit(&mut self, request: LayoutRequest) -> Result<()>;
    fn try_recv(&mut self) -> Result<Option<LayoutResponse>>;
}

/// Default backend: one worker thread running stateless layout passes.
pub struct ThreadBackend {
    request_tx: Sender<LayoutRequest>,
    response_rx: Receiver<LayoutResponse>,
}

impl ThreadBackend {
    pub fn spawn() -> Self {
        let (request_tx, request_rx) = mpsc::channel::<LayoutRequest>();
        let (response_tx, response_rx) = mpsc::channel();
        // The worker owns no shared state; it ends when the request sender
        // drops with the engine.
        thread::spawn(move || {
            while let Ok(request) = request_rx.recv() {
                if response_tx.send(selkie_core::layout(&request)).is_err() {
                    break;
                }
            }
        });
        Self {
            request_tx,
            response_rx,
        }
    }
}

impl LayoutBackend for ThreadBackend {
    fn submit(&mut self, request: LayoutRequest) -> Result<()> {
        self.request_tx
            .send(request)
            .map_err(|_| Error::WorkerDisconnected)
    }

    fn try_recv(&mut self) -> Result<Option<LayoutResponse>> {
        match self.response_rx.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::WorkerDisconnected),
        }
    }
}

pub struct LayoutEngine<S, B = ThreadBackend> {
    config: LayoutConfig,
    scheduler: Scheduler,
    backend: B,
    sink: S,
    pinned: IndexSet<NodeId>,
    drag_target: Option<NodeId>,
    next_request_id: u64,
    active_request: Option<u64>,
    computing: bool,
    enabled: bool,
    locked: bool,
}

impl<S: PositionSink> LayoutEngine<S, ThreadBackend> {
    pub fn new(config: LayoutConfig, sink: S) -> Self {
        Self::with_backend(config, sink, ThreadBackend::spawn())
    }
}

impl<S: PositionSink, B: LayoutBackend> LayoutEngine<S, B> {
    pub fn with_backend(config: LayoutConfig, sink: S, backend: B) -> Self {
        Self {
            config,
            scheduler: Scheduler::new(),
            backend,
            sink,
            pinned: IndexSet::new(),
            drag_target: None,
            next_request_id: 1,
            active_request: None,
            computing: false,
            enabled: true,
            locked: false,
        }
    }

    /// One cooperative cycle: diff the snapshot, seed fresh nodes, dispatch
    /// once the debounce window closes, and drain whatever responses have
    /// arrived. Never blocks.
    pub fn tick(
        &mut self,
        nodes: &[Node],
        edges: &[Edge],
        canvas_width: f64,
        canvas_height: f64,
        now: Instant,
    ) -> Result<()> {
        self.prune_transients(nodes);
        if self.enabled {
            let fresh = self.scheduler.observe(
                nodes,
                edges,
                canvas_width,
                canvas_height,
                self.config.repulsion_strength,
                now,
            );
            self.seed_new_nodes(&fresh, nodes, canvas_width, canvas_height);
            if !self.locked {
                if let Some(plan) = self.scheduler.take_ready(now, nodes, edges, &self.pinned) {
                    self.dispatch(plan, nodes, edges, canvas_width, canvas_height)?;
                }
            }
        }
        self.drain_responses(nodes)
    }

    /// True from dispatch until the matching response arrives; stale
    /// responses do not clear it.
    pub fn is_computing(&self) -> bool {
        self.computing
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            // Anything still in flight is superseded by the disable itself.
            self.scheduler.clear_pending();
            self.active_request = None;
            self.computing = false;
        }
    }

    /// Suppresses automatic layout; manual placement stays possible because
    /// nothing is ever applied without a dispatch.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// The one live user-tunable parameter. The next tick notices the change
    /// and widens the movable set to every node.
    pub fn set_repulsion_strength(&mut self, value: f64) {
        self.config.repulsion_strength = value;
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Full recompute from anchors; clears every pin.
    pub fn reset_layout(&mut self) {
        self.pinned.clear();
        self.scheduler.request_reset();
    }

    /// Called when a manual drag ends: the node stays where the user put it
    /// until an explicit reset.
    pub fn pin_node(&mut self, id: &str) {
        self.pinned.insert(id.to_string());
    }

    pub fn is_pinned(&self, id: &str) -> bool {
        self.pinned.contains(id)
    }

    pub fn begin_drag(&mut self, id: &str) {
        self.drag_target = Some(id.to_string());
    }

    pub fn end_drag(&mut self) {
        if let Some(id) = self.drag_target.take() {
            self.pinned.insert(id);
        }
    }

    fn prune_transients(&mut self, nodes: &[Node]) {
        let live: FxHashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        self.pinned.retain(|id| live.contains(id.as_str()));
        if self
            .drag_target
            .as_deref()
            .is_some_and(|id| !live.contains(id))
        {
            self.drag_target = None;
        }
    }

    /// Seeds first-seen nodes at their last-known coordinate (or the canvas
    /// center) plus id-derived jitter, so simultaneous insertions never
    /// stack on one point before the simulation starts.
    fn seed_new_nodes(
        &mut self,
        fresh: &[NodeId],
        nodes: &[Node],
        canvas_width: f64,
        canvas_height: f64,
    ) {
        let cx = if canvas_width.is_finite() { canvas_width / 2.0 } else { 512.0 };
        let cy = if canvas_height.is_finite() { canvas_height / 2.0 } else { 384.0 };
        for id in fresh {
            let Some(node) = nodes.iter().find(|n| &n.id == id) else {
                continue;
            };
            let (base_x, base_y) = if node.x.is_finite() && node.y.is_finite() {
                (node.x, node.y)
            } else {
                (cx, cy)
            };
            let mut rng = XorShift64Star::new(seed_for_id(id));
            self.sink.apply(
                id,
                base_x + rng.next_f64_signed() * NEW_NODE_JITTER,
                base_y + rng.next_f64_signed() * NEW_NODE_JITTER,
            );
        }
    }

    fn dispatch(
        &mut self,
        plan: DispatchPlan,
        nodes: &[Node],
        edges: &[Edge],
        canvas_width: f64,
        canvas_height: f64,
    ) -> Result<()> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        debug!(
            request_id,
            nodes = nodes.len(),
            movable = plan.movable_node_ids.len(),
            reset = plan.reset,
            "dispatching layout request"
        );
        self.backend.submit(LayoutRequest {
            request_id,
            canvas_width,
            canvas_height,
            reset: plan.reset,
            new_node_ids: plan.new_node_ids,
            movable_node_ids: plan.movable_node_ids,
            nodes: nodes.to_vec(),
            edges: edges.to_vec(),
            config: self.config.clone(),
        })?;
        self.active_request = Some(request_id);
        self.computing = true;
        Ok(())
    }

    fn drain_responses(&mut self, nodes: &[Node]) -> Result<()> {
        loop {
            let Some(response) = self.backend.try_recv()? else {
                return Ok(());
            };
            if self.active_request != Some(response.request_id) {
                trace!(
                    request_id = response.request_id,
                    "discarding stale layout response"
                );
                continue;
            }
            self.active_request = None;
            self.computing = false;

            let live: FxHashMap<&str, (f64, f64)> = nodes
                .iter()
                .map(|n| (n.id.as_str(), (n.x, n.y)))
                .collect();
            let mut applied = 0usize;
            for position in &response.positions {
                if !(position.x.is_finite() && position.y.is_finite()) {
                    continue;
                }
                if self.pinned.contains(&position.id) {
                    continue;
                }
                if self.drag_target.as_deref() == Some(position.id.as_str()) {
                    continue;
                }
                match live.get(position.id.as_str()) {
                    // Node left the live set while the computation ran.
                    None => continue,
                    Some(&(x, y)) if x == position.x && y == position.y => continue,
                    Some(_) => {}
                }
                self.sink.apply(&position.id, position.x, position.y);
                applied += 1;
            }
            debug!(
                request_id = response.request_id,
                applied, "applied layout response"
            );
        }
    }
}
