//! The force simulation itself: one stateless layout pass per request.
//!
//! Velocities, the spatial grid, and cluster assignments are all rebuilt
//! fresh on every call; the only state that survives a pass is the node
//! positions carried by the snapshot. This is a layout heuristic, not a
//! physics engine: damping exists purely for convergence.

use std::f64::consts::TAU;

use rustc_hash::FxHashSet;

use crate::cluster::Clusters;
use crate::geom::{Point, Vector, point, vector};
use crate::graph::{
    LayoutRequest, LayoutResponse, NodePosition, finite_or,
};
use crate::grid::SpatialGrid;
use crate::rng::{XorShift64Star, seed_for_id};

/// Velocity retained after each integration step.
const VELOCITY_DAMPING: f64 = 0.86;
/// Required clearance between circle borders; pairs closer than
/// `r_a + r_b + COLLISION_PADDING` count as overlapping.
const COLLISION_PADDING: f64 = 8.0;
/// Movable nodes may drift this far outside the canvas before being clamped.
const OVERFLOW_MARGIN: f64 = 140.0;
/// Repulsion multiplier for pairs in different clusters.
const CROSS_CLUSTER_REPULSION: f64 = 1.35;
/// Attraction multiplier for edges crossing a cluster boundary.
const CROSS_CLUSTER_ATTRACTION: f64 = 0.58;
/// Slack added to the preferred edge separation per unit of missing strength.
const STRENGTH_SLACK: f64 = 150.0;
/// Category anchors pull this many times harder than plain center gravity.
const CATEGORY_PULL_RATIO: f64 = 3.0;
/// Cluster anchors pull this many times harder than plain center gravity.
/// Steep on purpose: cluster membership, not category, decides the grouping.
const CLUSTER_PULL_RATIO: f64 = 120.0;
/// Per-iteration speed cap; keeps a force spike from tunneling a node.
const MAX_SPEED: f64 = 48.0;
/// Collision-only sweeps allowed after the iteration budget.
const MAX_POST_SWEEPS: usize = 24;
/// Lower bound on the squared distance fed into the inverse-square law.
const MIN_REPULSION_DIST_SQ: f64 = 36.0;

struct SimNode {
    pos: Point,
    vel: Vector,
    radius: f64,
    movable: bool,
}

struct SimEdge {
    a: usize,
    b: usize,
    strength: f64,
}

/// Runs one layout pass to completion and returns final positions for every
/// node in the request, in request order. Never fails: non-finite input
/// degrades to anchor reseeding, unknown edge endpoints are dropped.
pub fn layout(request: &LayoutRequest) -> LayoutResponse {
    let config = request.config.sanitized();
    let canvas_w = finite_or(request.canvas_width, 1024.0).max(1.0);
    let canvas_h = finite_or(request.canvas_height, 768.0).max(1.0);

    let nodes = &request.nodes;
    let clusters = Clusters::build(nodes, &request.edges, canvas_w, canvas_h);

    let mut id_to_idx = rustc_hash::FxHashMap::default();
    for (idx, node) in nodes.iter().enumerate() {
        id_to_idx.insert(node.id.as_str(), idx);
    }

    let mut edges: Vec<SimEdge> = Vec::with_capacity(request.edges.len());
    for edge in &request.edges {
        let (Some(&a), Some(&b)) = (
            id_to_idx.get(edge.source.as_str()),
            id_to_idx.get(edge.target.as_str()),
        ) else {
            continue;
        };
        if a == b {
            continue;
        }
        edges.push(SimEdge {
            a,
            b,
            strength: edge.clamped_strength(),
        });
    }

    let movable_ids: FxHashSet<&str> = request
        .movable_node_ids
        .iter()
        .map(String::as_str)
        .collect();

    let mut sim: Vec<SimNode> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| {
            let mut pos = point(node.x, node.y);
            if request.reset || !(pos.x.is_finite() && pos.y.is_finite()) {
                pos = seeded_position(&node.id, clusters.anchor(idx), config.initial_spread);
            }
            SimNode {
                pos,
                vel: Vector::zero(),
                radius: node.clamped_radius(config.node_radius),
                movable: request.reset || movable_ids.contains(node.id.as_str()),
            }
        })
        .collect();

    let max_radius = sim.iter().map(|s| s.radius).fold(0.0_f64, f64::max);
    let cell_size = SpatialGrid::cell_size_for(max_radius);
    let center = clusters.center();

    let mut forces: Vec<Vector> = vec![Vector::zero(); sim.len()];
    for _ in 0..config.iteration_budget {
        let positions: Vec<Point> = sim.iter().map(|s| s.pos).collect();
        let grid = SpatialGrid::build(&positions, cell_size);
        forces.fill(Vector::zero());

        // 1. Repulsion, grid-neighborhood candidates only.
        for i in 0..sim.len() {
            if !sim[i].movable {
                continue;
            }
            let mut acc = Vector::zero();
            grid.visit_neighborhood(positions[i], |j| {
                if j != i {
                    acc += pair_repulsion(i, j, &positions, &clusters, config.repulsion_strength);
                }
            });
            forces[i] += acc;
        }

        // 2. Edge attraction toward the preferred separation.
        for edge in &edges {
            let (a, b) = (edge.a, edge.b);
            if !sim[a].movable && !sim[b].movable {
                continue;
            }
            let delta = sim[b].pos - sim[a].pos;
            let dist = delta.length();
            let dir = if dist > 1e-3 {
                delta / dist
            } else {
                separation_axis(a, b)
            };
            let target =
                sim[a].radius + sim[b].radius + (1.0 - edge.strength) * STRENGTH_SLACK;
            let mut pull = config.attraction_strength * (dist - target);
            if !clusters.same_cluster(a, b) {
                pull *= CROSS_CLUSTER_ATTRACTION;
            }
            let force = dir * pull;
            if sim[a].movable {
                forces[a] += force;
            }
            if sim[b].movable {
                forces[b] -= force;
            }
        }

        // 3. Anchoring: center < category anchor < cluster anchor.
        for i in 0..sim.len() {
            if !sim[i].movable {
                continue;
            }
            let p = sim[i].pos;
            forces[i] += (center - p) * config.center_gravity
                + (clusters.category_anchor(i) - p) * (config.center_gravity * CATEGORY_PULL_RATIO)
                + (clusters.anchor(i) - p) * (config.center_gravity * CLUSTER_PULL_RATIO);
        }

        // 4. Damped integration.
        for i in 0..sim.len() {
            if !sim[i].movable {
                continue;
            }
            let mut vel = (sim[i].vel + forces[i]) * VELOCITY_DAMPING;
            let speed = vel.length();
            if speed > MAX_SPEED {
                vel = vel * (MAX_SPEED / speed);
            }
            sim[i].vel = vel;
            sim[i].pos += vel;
        }

        // 5. One overlap-resolution pass, then 6. the bound clamp.
        resolve_collisions(&mut sim, cell_size);
        clamp_to_bounds(&mut sim, canvas_w, canvas_h);
    }

    // Strict post-pass: collision-only sweeps until one comes back clean.
    for _ in 0..MAX_POST_SWEEPS {
        let moved = resolve_collisions(&mut sim, cell_size);
        clamp_to_bounds(&mut sim, canvas_w, canvas_h);
        if !moved {
            break;
        }
    }

    let positions = nodes
        .iter()
        .zip(&sim)
        .map(|(node, s)| NodePosition {
            id: node.id.clone(),
            x: s.pos.x,
            y: s.pos.y,
        })
        .collect();

    LayoutResponse {
        request_id: request.request_id,
        positions,
    }
}

fn seeded_position(id: &str, anchor: Point, spread: f64) -> Point {
    let mut rng = XorShift64Star::new(seed_for_id(id));
    point(
        anchor.x + rng.next_f64_signed() * spread,
        anchor.y + rng.next_f64_signed() * spread,
    )
}

fn pair_repulsion(
    i: usize,
    j: usize,
    positions: &[Point],
    clusters: &Clusters,
    repulsion_strength: f64,
) -> Vector {
    let delta = positions[i] - positions[j];
    let dist_sq = delta.square_length();
    let dir = if dist_sq > 1e-8 {
        delta / dist_sq.sqrt()
    } else {
        separation_axis(i, j)
    };
    let mut magnitude = repulsion_strength / dist_sq.max(MIN_REPULSION_DIST_SQ);
    if !clusters.same_cluster(i, j) {
        magnitude *= CROSS_CLUSTER_REPULSION;
    }
    dir * magnitude
}

/// Deterministic push direction for exactly coincident nodes.
fn separation_axis(i: usize, j: usize) -> Vector {
    let angle = ((i as f64) * 0.618_034 + (j as f64) * 0.414_214) * TAU;
    vector(angle.cos(), angle.sin())
}

/// One grid-accelerated overlap-resolution sweep. Overlap is split 50/50
/// when both nodes are movable, pushed entirely onto the movable one when
/// only one is, and skipped when neither is. Returns whether any overlap
/// was resolved, so callers can stop sweeping once an arrangement is clean.
fn resolve_collisions(sim: &mut [SimNode], cell_size: f64) -> bool {
    let positions: Vec<Point> = sim.iter().map(|s| s.pos).collect();
    let grid = SpatialGrid::build(&positions, cell_size);
    let mut moved = false;

    let mut partners: Vec<usize> = Vec::new();
    for i in 0..sim.len() {
        partners.clear();
        grid.visit_neighborhood(positions[i], |j| {
            if j > i {
                partners.push(j);
            }
        });
        for &j in &partners {
            if !sim[i].movable && !sim[j].movable {
                continue;
            }
            let delta = sim[j].pos - sim[i].pos;
            let dist = delta.length();
            let min_dist = sim[i].radius + sim[j].radius + COLLISION_PADDING;
            if dist >= min_dist {
                continue;
            }
            moved = true;
            let dir = if dist > 1e-3 {
                delta / dist
            } else {
                separation_axis(i, j)
            };
            let push = min_dist - dist;
            if sim[i].movable && sim[j].movable {
                sim[i].pos += dir * (-push * 0.5);
                sim[j].pos += dir * (push * 0.5);
            } else if sim[i].movable {
                sim[i].pos += dir * -push;
            } else {
                sim[j].pos += dir * push;
            }
        }
    }

    moved
}

fn clamp_to_bounds(sim: &mut [SimNode], canvas_w: f64, canvas_h: f64) {
    for node in sim.iter_mut().filter(|n| n.movable) {
        node.pos.x = node.pos.x.clamp(-OVERFLOW_MARGIN, canvas_w + OVERFLOW_MARGIN);
        node.pos.y = node.pos.y.clamp(-OVERFLOW_MARGIN, canvas_h + OVERFLOW_MARGIN);
    }
}
