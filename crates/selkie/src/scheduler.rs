//! Snapshot diffing and debounce scheduling.
//!
//! The scheduler owns the previous snapshot's shape (node-id set, edge
//! signatures, canvas size, repulsion strength) and turns host mutations
//! into a dispatch plan: which nodes the computation unit may move, and
//! whether prior positions should be ignored outright. Time is injected as
//! `Instant` values so the debounce window is testable without sleeping.

use std::time::{Duration, Instant};

use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};
use selkie_core::graph::{Edge, Node, NodeId};
use tracing::trace;

/// Fixed delay coalescing bursts of edits into one computation call.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// What to dispatch once the debounce window closes.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    pub reset: bool,
    pub new_node_ids: Vec<NodeId>,
    pub movable_node_ids: Vec<NodeId>,
}

#[derive(Debug)]
struct Pending {
    deadline: Instant,
    reset: bool,
    all_movable: bool,
    new_ids: IndexSet<NodeId>,
    seeds: IndexSet<NodeId>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    prev_ids: IndexSet<NodeId>,
    prev_edges: FxHashMap<(NodeId, NodeId), f64>,
    prev_canvas: Option<(f64, f64)>,
    prev_repulsion: Option<f64>,
    initialized: bool,
    reset_requested: bool,
    pending: Option<Pending>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs the current snapshot against the previous one, folding any
    /// change into the pending plan and restarting the debounce window.
    /// Returns the ids seen for the first time, so the host can seed them.
    pub fn observe(
        &mut self,
        nodes: &[Node],
        edges: &[Edge],
        canvas_width: f64,
        canvas_height: f64,
        repulsion_strength: f64,
        now: Instant,
    ) -> Vec<NodeId> {
        let current_ids: IndexSet<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        let fresh: Vec<NodeId> = current_ids
            .iter()
            .filter(|id| !self.prev_ids.contains(*id))
            .cloned()
            .collect();

        // Edge signatures: (source, target) -> summed clamped strength.
        // Summing makes duplicate edges between one pair register as one
        // signature whose value still shifts when a duplicate is added.
        let mut edge_sigs: FxHashMap<(NodeId, NodeId), f64> = FxHashMap::default();
        for edge in edges {
            *edge_sigs
                .entry((edge.source.clone(), edge.target.clone()))
                .or_insert(0.0) += edge.clamped_strength();
        }

        // Added / strength-changed edges seed both current endpoints; removed
        // edges seed both old endpoints.
        let mut seeds: IndexSet<NodeId> = IndexSet::new();
        for (key, strength) in &edge_sigs {
            match self.prev_edges.get(key) {
                Some(prev) if (prev - strength).abs() <= f64::EPSILON => {}
                _ => {
                    seeds.insert(key.0.clone());
                    seeds.insert(key.1.clone());
                }
            }
        }
        for key in self.prev_edges.keys() {
            if !edge_sigs.contains_key(key) {
                seeds.insert(key.0.clone());
                seeds.insert(key.1.clone());
            }
        }

        let canvas = (canvas_width, canvas_height);
        let canvas_changed = self.prev_canvas.is_some_and(|prev| prev != canvas);
        let repulsion_changed = self
            .prev_repulsion
            .is_some_and(|prev| prev != repulsion_strength);
        let first_run = !self.initialized && !nodes.is_empty();
        let reset = first_run || self.reset_requested;
        self.reset_requested = false;

        let structural = !fresh.is_empty() || !seeds.is_empty();
        if structural || canvas_changed || repulsion_changed || reset {
            let deadline = now + DEBOUNCE_DELAY;
            let pending = self.pending.get_or_insert_with(|| Pending {
                deadline,
                reset: false,
                all_movable: false,
                new_ids: IndexSet::new(),
                seeds: IndexSet::new(),
            });
            pending.deadline = deadline;
            pending.reset |= reset;
            pending.all_movable |= reset || canvas_changed || repulsion_changed;
            pending.new_ids.extend(fresh.iter().cloned());
            pending.seeds.extend(seeds);
            trace!(
                new = pending.new_ids.len(),
                seeds = pending.seeds.len(),
                reset = pending.reset,
                "debounce window restarted"
            );
        }

        // Adopt the snapshot; transient state never outlives a departed node.
        if let Some(pending) = self.pending.as_mut() {
            pending.new_ids.retain(|id| current_ids.contains(id));
            pending.seeds.retain(|id| current_ids.contains(id));
        }
        self.prev_ids = current_ids;
        self.prev_edges = edge_sigs;
        self.prev_canvas = Some(canvas);
        self.prev_repulsion = Some(repulsion_strength);
        if !nodes.is_empty() {
            self.initialized = true;
        }

        fresh
    }

    /// Takes the pending plan once its debounce deadline has passed.
    ///
    /// The movable set is `new nodes + their direct neighbors + endpoints of
    /// every changed edge`, minus pinned ids; a canvas, repulsion, or reset
    /// trigger widens it to every (unpinned) node, since the global spacing
    /// assumptions changed.
    pub fn take_ready(
        &mut self,
        now: Instant,
        nodes: &[Node],
        edges: &[Edge],
        pinned: &IndexSet<NodeId>,
    ) -> Option<DispatchPlan> {
        if self.pending.as_ref().is_none_or(|p| now < p.deadline) {
            return None;
        }
        let pending = self.pending.take()?;

        let movable_node_ids: Vec<NodeId> = if pending.reset || pending.all_movable {
            nodes
                .iter()
                .map(|n| n.id.clone())
                .filter(|id| !pinned.contains(id))
                .collect()
        } else {
            let mut set: IndexSet<NodeId> = pending.seeds.clone();
            set.extend(pending.new_ids.iter().cloned());
            for edge in edges {
                if pending.new_ids.contains(&edge.source) {
                    set.insert(edge.target.clone());
                }
                if pending.new_ids.contains(&edge.target) {
                    set.insert(edge.source.clone());
                }
            }
            let live: FxHashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
            set.retain(|id| live.contains(id.as_str()) && !pinned.contains(id));
            set.into_iter().collect()
        };

        Some(DispatchPlan {
            reset: pending.reset,
            new_node_ids: pending.new_ids.into_iter().collect(),
            movable_node_ids,
        })
    }

    /// Marks the next observation as a full reset (ignore prior positions).
    pub fn request_reset(&mut self) {
        self.reset_requested = true;
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
        self.reset_requested = false;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(id: &str, x: f64, y: f64) -> Node {
        let mut n = Node::subnode(id, "misc");
        n.x = x;
        n.y = y;
        n
    }

    /// A ten-node chain-plus-chords graph with twelve edges.
    fn stable_graph() -> (Vec<Node>, Vec<Edge>) {
        let nodes: Vec<Node> = (0..10)
            .map(|i| node_at(&format!("n{i}"), 100.0 + 60.0 * i as f64, 200.0))
            .collect();
        let mut edges: Vec<Edge> = (0..9)
            .map(|i| Edge::new(format!("n{i}"), format!("n{}", i + 1), 0.6))
            .collect();
        edges.push(Edge::new("n0", "n5", 0.3));
        edges.push(Edge::new("n2", "n7", 0.3));
        edges.push(Edge::new("n4", "n9", 0.3));
        (nodes, edges)
    }

    fn settled(scheduler: &mut Scheduler, nodes: &[Node], edges: &[Edge], t: Instant) -> Instant {
        scheduler.observe(nodes, edges, 1200.0, 900.0, 6500.0, t);
        let after = t + DEBOUNCE_DELAY + Duration::from_millis(100);
        let plan = scheduler
            .take_ready(after, nodes, edges, &IndexSet::new())
            .expect("initial plan");
        assert!(plan.reset, "first run for a node set is a reset");
        after
    }

    #[test]
    fn first_run_resets_and_moves_everything() {
        let (nodes, edges) = stable_graph();
        let mut scheduler = Scheduler::new();
        let t0 = Instant::now();
        scheduler.observe(&nodes, &edges, 1200.0, 900.0, 6500.0, t0);
        let plan = scheduler
            .take_ready(t0 + DEBOUNCE_DELAY, &nodes, &edges, &IndexSet::new())
            .expect("plan after debounce");
        assert!(plan.reset);
        assert_eq!(plan.movable_node_ids.len(), nodes.len());
    }

    #[test]
    fn quiet_snapshots_schedule_nothing() {
        let (nodes, edges) = stable_graph();
        let mut scheduler = Scheduler::new();
        let t = settled(&mut scheduler, &nodes, &edges, Instant::now());
        scheduler.observe(&nodes, &edges, 1200.0, 900.0, 6500.0, t);
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn inserting_one_node_moves_only_its_neighborhood() {
        let (mut nodes, mut edges) = stable_graph();
        let mut scheduler = Scheduler::new();
        let t = settled(&mut scheduler, &nodes, &edges, Instant::now());

        nodes.push(node_at("n10", 400.0, 400.0));
        edges.push(Edge::new("n10", "n3", 0.5));
        edges.push(Edge::new("n10", "n6", 0.5));
        scheduler.observe(&nodes, &edges, 1200.0, 900.0, 6500.0, t);
        let plan = scheduler
            .take_ready(t + DEBOUNCE_DELAY, &nodes, &edges, &IndexSet::new())
            .expect("plan");

        assert!(!plan.reset);
        let movable: IndexSet<&str> = plan.movable_node_ids.iter().map(String::as_str).collect();
        let expected: IndexSet<&str> = ["n10", "n3", "n6"].into_iter().collect();
        assert_eq!(movable, expected, "only the insertion neighborhood moves");
        assert_eq!(plan.new_node_ids, vec!["n10".to_string()]);
    }

    #[test]
    fn strength_change_seeds_both_endpoints() {
        let (nodes, mut edges) = stable_graph();
        let mut scheduler = Scheduler::new();
        let t = settled(&mut scheduler, &nodes, &edges, Instant::now());

        edges[0].strength = 0.95;
        scheduler.observe(&nodes, &edges, 1200.0, 900.0, 6500.0, t);
        let plan = scheduler
            .take_ready(t + DEBOUNCE_DELAY, &nodes, &edges, &IndexSet::new())
            .expect("plan");
        let movable: IndexSet<&str> = plan.movable_node_ids.iter().map(String::as_str).collect();
        let expected: IndexSet<&str> = ["n0", "n1"].into_iter().collect();
        assert_eq!(movable, expected);
    }

    #[test]
    fn removed_edge_seeds_its_old_endpoints() {
        let (nodes, mut edges) = stable_graph();
        let mut scheduler = Scheduler::new();
        let t = settled(&mut scheduler, &nodes, &edges, Instant::now());

        let removed = edges.pop().expect("edge"); // n4 -> n9
        scheduler.observe(&nodes, &edges, 1200.0, 900.0, 6500.0, t);
        let plan = scheduler
            .take_ready(t + DEBOUNCE_DELAY, &nodes, &edges, &IndexSet::new())
            .expect("plan");
        let movable: IndexSet<&str> = plan.movable_node_ids.iter().map(String::as_str).collect();
        let expected: IndexSet<&str> = [removed.source.as_str(), removed.target.as_str()]
            .into_iter()
            .collect();
        assert_eq!(movable, expected);
    }

    #[test]
    fn canvas_resize_moves_everything_except_pinned() {
        let (nodes, edges) = stable_graph();
        let mut scheduler = Scheduler::new();
        let t = settled(&mut scheduler, &nodes, &edges, Instant::now());

        scheduler.observe(&nodes, &edges, 1400.0, 900.0, 6500.0, t);
        let pinned: IndexSet<NodeId> = ["n2".to_string()].into_iter().collect();
        let plan = scheduler
            .take_ready(t + DEBOUNCE_DELAY, &nodes, &edges, &pinned)
            .expect("plan");
        assert!(!plan.reset);
        assert_eq!(plan.movable_node_ids.len(), nodes.len() - 1);
        assert!(!plan.movable_node_ids.contains(&"n2".to_string()));
    }

    #[test]
    fn repulsion_retune_moves_everything() {
        let (nodes, edges) = stable_graph();
        let mut scheduler = Scheduler::new();
        let t = settled(&mut scheduler, &nodes, &edges, Instant::now());

        scheduler.observe(&nodes, &edges, 1200.0, 900.0, 9000.0, t);
        let plan = scheduler
            .take_ready(t + DEBOUNCE_DELAY, &nodes, &edges, &IndexSet::new())
            .expect("plan");
        assert_eq!(plan.movable_node_ids.len(), nodes.len());
    }

    #[test]
    fn bursts_coalesce_behind_a_rolling_deadline() {
        let (mut nodes, edges) = stable_graph();
        let mut scheduler = Scheduler::new();
        let t = settled(&mut scheduler, &nodes, &edges, Instant::now());

        nodes.push(node_at("a", 1.0, 1.0));
        scheduler.observe(&nodes, &edges, 1200.0, 900.0, 6500.0, t);
        let mid = t + Duration::from_millis(300);
        nodes.push(node_at("b", 2.0, 2.0));
        scheduler.observe(&nodes, &edges, 1200.0, 900.0, 6500.0, mid);

        // Original deadline has passed, but the second edit pushed it out.
        assert!(
            scheduler
                .take_ready(t + DEBOUNCE_DELAY, &nodes, &edges, &IndexSet::new())
                .is_none()
        );
        let plan = scheduler
            .take_ready(mid + DEBOUNCE_DELAY, &nodes, &edges, &IndexSet::new())
            .expect("coalesced plan");
        assert_eq!(plan.new_node_ids.len(), 2, "both insertions in one plan");
    }

    #[test]
    fn departed_nodes_are_pruned_from_the_plan() {
        let (mut nodes, mut edges) = stable_graph();
        let mut scheduler = Scheduler::new();
        let t = settled(&mut scheduler, &nodes, &edges, Instant::now());

        nodes.push(node_at("temp", 0.0, 0.0));
        edges.push(Edge::new("temp", "n0", 0.5));
        scheduler.observe(&nodes, &edges, 1200.0, 900.0, 6500.0, t);

        // The node vanishes again before the window closes.
        nodes.pop();
        edges.pop();
        scheduler.observe(&nodes, &edges, 1200.0, 900.0, 6500.0, t);
        let plan = scheduler
            .take_ready(t + DEBOUNCE_DELAY, &nodes, &edges, &IndexSet::new())
            .expect("plan");
        assert!(!plan.new_node_ids.contains(&"temp".to_string()));
        assert!(!plan.movable_node_ids.contains(&"temp".to_string()));
        // n0 still gets nudged: its edge set changed twice.
        assert!(plan.movable_node_ids.contains(&"n0".to_string()));
    }
}
