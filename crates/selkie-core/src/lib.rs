#![forbid(unsafe_code)]

//! Headless incremental force-directed layout for evolving thought graphs.
//!
//! `selkie-core` is the isolated computation unit of the `selkie` workspace:
//! a single pure entry point takes a full node/edge snapshot plus movability
//! constraints and runs one simulation pass to its iteration budget, ending
//! with strict collision-only sweeps. There is no persistent simulation
//! state; request/response scheduling lives in the `selkie` facade crate.

pub mod cluster;
pub mod geom;
pub mod graph;
pub mod grid;
pub mod rng;
pub mod sim;

pub use cluster::Clusters;
pub use graph::{
    Edge, LayoutConfig, LayoutRequest, LayoutResponse, Node, NodeId, NodeKind, NodePosition,
};

/// Stateless layout entry point: one request in, one response out.
pub fn layout(request: &LayoutRequest) -> LayoutResponse {
    sim::layout(request)
}
