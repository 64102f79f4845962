#![forbid(unsafe_code)]

//! `selkie` keeps a force-directed canvas layout current while the graph
//! underneath it keeps changing.
//!
//! The host owns all node/edge storage and drives a [`LayoutEngine`] from
//! its UI loop: every [`LayoutEngine::tick`] diffs the latest snapshot,
//! debounces bursts of edits, dispatches one request to an isolated
//! computation worker, and applies the matching response through a
//! [`PositionSink`] callback, skipping pinned and dragged nodes as they are
//! at apply time. The simulation itself lives in `selkie-core` and is
//! re-exported here.

pub use selkie_core::*;

mod engine;
mod error;
pub mod scheduler;

pub use engine::{LayoutBackend, LayoutEngine, PositionSink, ThreadBackend};
pub use error::{Error, Result};
pub use scheduler::{DEBOUNCE_DELAY, DispatchPlan, Scheduler};
