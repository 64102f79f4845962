//! Plain-data snapshot types exchanged between the host and the layout unit.
//!
//! The computation unit is stateless per call: every request carries the full
//! node/edge snapshot plus the subset of ids it is currently allowed to move.

use serde::{Deserialize, Serialize};

pub type NodeId = String;

/// Node radius bounds; anything outside is clamped before simulation.
pub const MIN_NODE_RADIUS: f64 = 18.0;
pub const MAX_NODE_RADIUS: f64 = 220.0;

/// Edge strength bounds; anything outside is clamped before simulation.
pub const MIN_EDGE_STRENGTH: f64 = 0.1;
pub const MAX_EDGE_STRENGTH: f64 = 1.0;

pub(crate) fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Top-level topic node; can anchor a cluster of its own.
    Umbrella,
    /// Any non-umbrella node; may declare multiple parent umbrellas.
    Subnode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub category: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub parent_ids: Vec<NodeId>,
}

impl Node {
    pub fn umbrella(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            x: 0.0,
            y: 0.0,
            radius: 60.0,
            category: String::new(),
            kind: NodeKind::Umbrella,
            parent_ids: Vec::new(),
        }
    }

    pub fn subnode(id: impl Into<NodeId>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: 0.0,
            y: 0.0,
            radius: 28.0,
            category: category.into(),
            kind: NodeKind::Subnode,
            parent_ids: Vec::new(),
        }
    }

    /// Radius with the [MIN_NODE_RADIUS, MAX_NODE_RADIUS] clamp applied.
    /// A non-finite radius falls back to the configured default instead.
    pub fn clamped_radius(&self, fallback: f64) -> f64 {
        finite_or(self.radius, fallback).clamp(MIN_NODE_RADIUS, MAX_NODE_RADIUS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub strength: f64,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, strength: f64) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            strength,
        }
    }

    /// Strength with the [MIN_EDGE_STRENGTH, MAX_EDGE_STRENGTH] clamp applied.
    pub fn clamped_strength(&self) -> f64 {
        finite_or(self.strength, MIN_EDGE_STRENGTH).clamp(MIN_EDGE_STRENGTH, MAX_EDGE_STRENGTH)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Fallback radius for nodes carrying a non-finite radius.
    pub node_radius: f64,
    /// Inverse-square repulsion scale; the one live user-tunable parameter.
    pub repulsion_strength: f64,
    /// Spring coefficient pulling edge endpoints toward their preferred separation.
    pub attraction_strength: f64,
    /// Weak pull toward the canvas center. Category anchors pull harder and
    /// cluster anchors hardest; both are fixed multiples of this value.
    pub center_gravity: f64,
    /// Force iterations per layout pass. Always run in full; termination is
    /// iteration-count based, never energy based.
    pub iteration_budget: usize,
    /// Jitter half-width, in pixels, when a node is (re)seeded at its anchor.
    pub initial_spread: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_radius: 42.0,
            repulsion_strength: 6500.0,
            attraction_strength: 0.045,
            center_gravity: 5.0e-4,
            iteration_budget: 300,
            initial_spread: 110.0,
        }
    }
}

impl LayoutConfig {
    /// Copy of the config with every non-finite field replaced by its default.
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        Self {
            node_radius: finite_or(self.node_radius, d.node_radius),
            repulsion_strength: finite_or(self.repulsion_strength, d.repulsion_strength).max(0.0),
            attraction_strength: finite_or(self.attraction_strength, d.attraction_strength)
                .max(0.0),
            center_gravity: finite_or(self.center_gravity, d.center_gravity).max(0.0),
            iteration_budget: self.iteration_budget,
            initial_spread: finite_or(self.initial_spread, d.initial_spread).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutRequest {
    /// Strictly increasing; the host discards any response that does not
    /// match the most recently dispatched id.
    pub request_id: u64,
    pub canvas_width: f64,
    pub canvas_height: f64,
    /// Ignore prior positions and reseed every node at its cluster anchor.
    pub reset: bool,
    pub new_node_ids: Vec<NodeId>,
    pub movable_node_ids: Vec<NodeId>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub config: LayoutConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutResponse {
    pub request_id: u64,
    pub positions: Vec<NodePosition>,
}
