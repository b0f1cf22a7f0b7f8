//! Dependency Graph
//!
//! This module implements the graph that records which reactive nodes read
//! which others.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes are signals, computeds or effects
//! - Edges run from a source to an observer: if B read A during its last run,
//!   B observes A
//!
//! Edges are rebuilt after every run of a computed or effect, so a node that
//! stops reading a source also stops observing it.
//!
//! When a signal changes, its observers are colored `Dirty` and everything
//! further downstream `Check`. Computeds then pull: a `Check` node re-runs
//! only if one of its sources actually produced a new value.

mod arena;
mod node;
mod snapshot;

pub(crate) use arena::Graph;
pub(crate) use node::Computation;
pub use node::{NodeId, NodeKind, NodeState};
pub use snapshot::{GraphSnapshot, NodeSnapshot};
