//! Cluster assignment and anchor placement.
//!
//! Every node resolves to a cluster key: an umbrella node's id, or a
//! `category:<name>` pseudo-cluster when no umbrella claims it. Umbrella
//! clusters are anchored on a ring around the canvas center; pseudo-clusters
//! get one fixed point per category.

use std::f64::consts::{FRAC_PI_2, TAU};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::geom::{Point, point};
use crate::graph::{Edge, Node, NodeKind, finite_or};

/// Ring radius = clamp(RING_RADIUS_FACTOR * min(w, h), MIN.., MAX..).
pub const RING_RADIUS_FACTOR: f64 = 0.32;
pub const MIN_RING_RADIUS: f64 = 180.0;
pub const MAX_RING_RADIUS: f64 = 420.0;

/// Category used when a node declares none.
pub const DEFAULT_CATEGORY: &str = "misc";

/// Prefix for pseudo-cluster keys derived from a category.
pub const CATEGORY_KEY_PREFIX: &str = "category:";

#[derive(Debug, Clone)]
pub struct Clusters {
    keys: Vec<String>,
    cluster_anchors: Vec<Point>,
    category_anchors: Vec<Point>,
    center: Point,
    ring_radius: f64,
}

impl Clusters {
    /// Resolves cluster keys and anchors for a snapshot. Edges referencing
    /// unknown ids are ignored, matching the simulation's own edge handling.
    pub fn build(nodes: &[Node], edges: &[Edge], canvas_width: f64, canvas_height: f64) -> Self {
        let w = finite_or(canvas_width, 1024.0).max(1.0);
        let h = finite_or(canvas_height, 768.0).max(1.0);
        let center = point(w / 2.0, h / 2.0);

        let mut id_to_idx: FxHashMap<&str, usize> = FxHashMap::default();
        for (idx, node) in nodes.iter().enumerate() {
            id_to_idx.insert(node.id.as_str(), idx);
        }

        // Neighbor weight table: summed clamped strengths per node pair, in
        // first-seen order so weight ties resolve deterministically.
        let mut weights: Vec<IndexMap<usize, f64>> = vec![IndexMap::new(); nodes.len()];
        for edge in edges {
            let (Some(&a), Some(&b)) = (
                id_to_idx.get(edge.source.as_str()),
                id_to_idx.get(edge.target.as_str()),
            ) else {
                continue;
            };
            if a == b {
                continue;
            }
            let s = edge.clamped_strength();
            *weights[a].entry(b).or_insert(0.0) += s;
            *weights[b].entry(a).or_insert(0.0) += s;
        }

        let keys: Vec<String> = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| resolve_key(idx, node, nodes, &id_to_idx, &weights))
            .collect();

        // Umbrella clusters sit evenly on a ring, ordered by sorted key so the
        // arrangement is stable across runs.
        let ring_radius = (RING_RADIUS_FACTOR * w.min(h)).clamp(MIN_RING_RADIUS, MAX_RING_RADIUS);
        let mut umbrella_keys: Vec<&str> = nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Umbrella)
            .map(|n| n.id.as_str())
            .collect();
        umbrella_keys.sort_unstable();
        umbrella_keys.dedup();

        let mut ring_anchor_by_key: FxHashMap<&str, Point> = FxHashMap::default();
        let count = umbrella_keys.len();
        for (slot, key) in umbrella_keys.iter().enumerate() {
            let angle = -FRAC_PI_2 + (slot as f64) * TAU / (count as f64);
            ring_anchor_by_key.insert(
                key,
                point(
                    center.x + ring_radius * angle.cos(),
                    center.y + ring_radius * angle.sin(),
                ),
            );
        }

        let category_anchors: Vec<Point> = nodes
            .iter()
            .map(|n| category_anchor_point(&n.category, w, h))
            .collect();
        let cluster_anchors: Vec<Point> = keys
            .iter()
            .map(|key| match ring_anchor_by_key.get(key.as_str()) {
                Some(&anchor) => anchor,
                None => {
                    let category = key
                        .strip_prefix(CATEGORY_KEY_PREFIX)
                        .unwrap_or(DEFAULT_CATEGORY);
                    category_anchor_point(category, w, h)
                }
            })
            .collect();

        Self {
            keys,
            cluster_anchors,
            category_anchors,
            center,
            ring_radius,
        }
    }

    pub fn key(&self, idx: usize) -> &str {
        &self.keys[idx]
    }

    pub fn same_cluster(&self, a: usize, b: usize) -> bool {
        self.keys[a] == self.keys[b]
    }

    /// Target point all nodes sharing this node's cluster key are pulled toward.
    pub fn anchor(&self, idx: usize) -> Point {
        self.cluster_anchors[idx]
    }

    /// Fixed per-category point, independent of cluster membership.
    pub fn category_anchor(&self, idx: usize) -> Point {
        self.category_anchors[idx]
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn ring_radius(&self) -> f64 {
        self.ring_radius
    }
}

fn resolve_key(
    idx: usize,
    node: &Node,
    nodes: &[Node],
    id_to_idx: &FxHashMap<&str, usize>,
    weights: &[IndexMap<usize, f64>],
) -> String {
    if node.kind == NodeKind::Umbrella {
        return node.id.clone();
    }

    // (1) Declared umbrella parents, by combined edge weight. Strict `>` keeps
    // the first-seen candidate on ties (declaration order).
    let mut best: Option<(usize, f64)> = None;
    for parent_id in &node.parent_ids {
        let Some(&parent) = id_to_idx.get(parent_id.as_str()) else {
            continue;
        };
        if parent == idx || nodes[parent].kind != NodeKind::Umbrella {
            continue;
        }
        let weight = weights[idx].get(&parent).copied().unwrap_or(0.0);
        if best.is_none_or(|(_, w)| weight > w) {
            best = Some((parent, weight));
        }
    }

    // (2) Otherwise any umbrella among edge neighbors, heaviest first.
    if best.is_none() {
        for (&neighbor, &weight) in &weights[idx] {
            if nodes[neighbor].kind != NodeKind::Umbrella {
                continue;
            }
            if best.is_none_or(|(_, w)| weight > w) {
                best = Some((neighbor, weight));
            }
        }
    }

    match best {
        Some((umbrella, _)) => nodes[umbrella].id.clone(),
        None => format!("{CATEGORY_KEY_PREFIX}{}", normalized_category(&node.category)),
    }
}

pub(crate) fn normalized_category(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

fn category_anchor_point(category: &str, w: f64, h: f64) -> Point {
    match normalized_category(category).as_str() {
        "technical" => point(0.22 * w, 0.50 * h),
        "learning" => point(0.78 * w, 0.50 * h),
        "personal" | "organic" => point(0.50 * w, 0.78 * h),
        "creative" => point(0.50 * w, 0.22 * h),
        _ => point(0.50 * w, 0.50 * h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};

    fn subnode_with_parents(id: &str, parents: &[&str]) -> Node {
        let mut n = Node::subnode(id, "");
        n.parent_ids = parents.iter().map(|p| p.to_string()).collect();
        n
    }

    #[test]
    fn umbrella_is_its_own_cluster() {
        let nodes = vec![Node::umbrella("u1")];
        let clusters = Clusters::build(&nodes, &[], 1000.0, 800.0);
        assert_eq!(clusters.key(0), "u1");
    }

    #[test]
    fn heaviest_umbrella_parent_wins() {
        let nodes = vec![
            Node::umbrella("u1"),
            Node::umbrella("u2"),
            subnode_with_parents("s", &["u1", "u2"]),
        ];
        let edges = vec![Edge::new("s", "u1", 0.3), Edge::new("s", "u2", 0.9)];
        let clusters = Clusters::build(&nodes, &edges, 1000.0, 800.0);
        assert_eq!(clusters.key(2), "u2");
    }

    #[test]
    fn parent_ties_break_by_declaration_order() {
        let nodes = vec![
            Node::umbrella("u1"),
            Node::umbrella("u2"),
            subnode_with_parents("s", &["u2", "u1"]),
        ];
        // No edges at all: both parents weigh zero, first declared wins.
        let clusters = Clusters::build(&nodes, &[], 1000.0, 800.0);
        assert_eq!(clusters.key(2), "u2");
    }

    #[test]
    fn umbrella_neighbor_claims_orphan_subnode() {
        let nodes = vec![
            Node::umbrella("hub"),
            Node::subnode("stray", "technical"),
            Node::subnode("other", "technical"),
        ];
        let edges = vec![
            Edge::new("stray", "other", 1.0),
            Edge::new("stray", "hub", 0.4),
        ];
        let clusters = Clusters::build(&nodes, &edges, 1000.0, 800.0);
        // "other" is heavier but not an umbrella; "hub" is the heaviest umbrella.
        assert_eq!(clusters.key(1), "hub");
    }

    #[test]
    fn category_fallback_lowercases_and_defaults() {
        let nodes = vec![Node::subnode("a", "Creative"), Node::subnode("b", "  ")];
        let clusters = Clusters::build(&nodes, &[], 1000.0, 800.0);
        assert_eq!(clusters.key(0), "category:creative");
        assert_eq!(clusters.key(1), "category:misc");
    }

    #[test]
    fn umbrella_ring_starts_at_top_and_spaces_evenly() {
        let nodes = vec![
            Node::umbrella("a"),
            Node::umbrella("b"),
            Node::umbrella("c"),
        ];
        let (w, h) = (1200.0, 900.0);
        let clusters = Clusters::build(&nodes, &[], w, h);
        let radius = (RING_RADIUS_FACTOR * h).clamp(MIN_RING_RADIUS, MAX_RING_RADIUS);
        assert_eq!(clusters.ring_radius(), radius);

        let center = clusters.center();
        // Sorted keys a, b, c at -90deg, 30deg, 150deg.
        let expected = [-FRAC_PI_2, -FRAC_PI_2 + TAU / 3.0, -FRAC_PI_2 + 2.0 * TAU / 3.0];
        for (idx, angle) in expected.iter().enumerate() {
            let anchor = clusters.anchor(idx);
            assert!((anchor.x - (center.x + radius * angle.cos())).abs() < 1e-9);
            assert!((anchor.y - (center.y + radius * angle.sin())).abs() < 1e-9);
        }
    }

    #[test]
    fn ring_radius_clamps_on_small_canvases() {
        let nodes = vec![Node::umbrella("a")];
        let clusters = Clusters::build(&nodes, &[], 300.0, 300.0);
        assert_eq!(clusters.ring_radius(), MIN_RING_RADIUS);
    }

    #[test]
    fn category_anchor_points_match_layout_quadrants() {
        let nodes = vec![
            Node::subnode("t", "technical"),
            Node::subnode("l", "learning"),
            Node::subnode("p", "personal"),
            Node::subnode("c", "creative"),
            Node::subnode("x", "unheard-of"),
        ];
        let (w, h) = (1000.0, 800.0);
        let clusters = Clusters::build(&nodes, &[], w, h);
        let cases = [
            (0, 220.0, 400.0),
            (1, 780.0, 400.0),
            (2, 500.0, 624.0),
            (3, 500.0, 176.0),
            (4, 500.0, 400.0),
        ];
        for (idx, x, y) in cases {
            let anchor = clusters.category_anchor(idx);
            assert!(
                (anchor.x - x).abs() < 1e-9 && (anchor.y - y).abs() < 1e-9,
                "anchor {idx}: got ({}, {}), want ({x}, {y})",
                anchor.x,
                anchor.y
            );
        }
    }
}
