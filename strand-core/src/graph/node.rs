//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;

use crate::reactive::Reactive;

/// Identifier of a node within one runtime's dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Build an ID from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A writable cell. Roots of the graph: observers only, no sources.
    Signal,

    /// A derived value. Has sources and may have observers.
    Computed,

    /// A side effect. Leaves of the graph: sources only.
    Effect,
}

/// Freshness of a computed or effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Up to date with every source.
    Clean,

    /// A transitive source changed; the direct sources must be refreshed
    /// before deciding whether to re-run.
    Check,

    /// A direct source changed. Must re-run.
    Dirty,
}

/// What to call when a node has to re-run.
///
/// Computeds are owned by their handles, so the graph only keeps a weak
/// reference. Effects have no handle and are owned by the graph until
/// disposed.
pub(crate) enum Computation {
    Derived(Weak<dyn Reactive>),
    Effect(Rc<dyn Reactive>),
}

impl Computation {
    pub(crate) fn upgrade(&self) -> Option<Rc<dyn Reactive>> {
        match self {
            Computation::Derived(weak) => weak.upgrade(),
            Computation::Effect(rc) => Some(Rc::clone(rc)),
        }
    }
}

/// A node in the dependency graph.
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) state: NodeState,

    /// Set while the node's computation is on the stack.
    pub(crate) running: bool,

    /// Nodes read during the last run, in first-read order.
    pub(crate) sources: SmallVec<[NodeId; 4]>,

    /// Nodes whose last run read this node, in subscription order.
    pub(crate) observers: IndexSet<NodeId>,

    pub(crate) computation: Option<Computation>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            state: NodeState::Clean,
            running: false,
            sources: SmallVec::new(),
            observers: IndexSet::new(),
            computation: None,
        }
    }

    /// Mark as maybe dirty. A node that is already dirty stays dirty.
    pub(crate) fn mark_check(&mut self) {
        if self.state == NodeState::Clean {
            self.state = NodeState::Check;
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.state = NodeState::Dirty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_displays_with_hash() {
        assert_eq!(NodeId::from_raw(12).to_string(), "#12");
        assert_eq!(NodeId::from_raw(12).raw(), 12);
    }

    #[test]
    fn new_nodes_start_clean() {
        let node = Node::new(NodeKind::Computed);
        assert_eq!(node.state, NodeState::Clean);
        assert!(!node.running);
        assert!(node.sources.is_empty());
        assert!(node.observers.is_empty());
    }

    #[test]
    fn state_transitions() {
        let mut node = Node::new(NodeKind::Effect);

        node.mark_check();
        assert_eq!(node.state, NodeState::Check);

        node.mark_dirty();
        assert_eq!(node.state, NodeState::Dirty);

        // Check never downgrades dirty
        node.mark_check();
        assert_eq!(node.state, NodeState::Dirty);
    }
}
