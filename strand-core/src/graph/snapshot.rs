//! Graph Snapshots
//!
//! A serializable picture of the dependency graph, for debugging and tests.

use serde::Serialize;

use super::arena::Graph;
use super::node::{NodeId, NodeKind, NodeState};

/// One node as seen in a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub state: NodeState,
    /// Nodes this node read during its last run.
    pub sources: Vec<NodeId>,
    /// Nodes that read this node during their last run.
    pub observers: Vec<NodeId>,
}

/// Every live node of a runtime, in creation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

impl GraphSnapshot {
    pub(crate) fn capture(graph: &Graph) -> Self {
        let nodes = graph
            .iter()
            .map(|(id, node)| NodeSnapshot {
                id: *id,
                kind: node.kind,
                state: node.state,
                sources: node.sources.to_vec(),
                observers: node.observers.iter().copied().collect(),
            })
            .collect();
        Self { nodes }
    }

    /// Look up a node by ID.
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Count the edges of the graph.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|node| node.sources.len()).sum()
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
