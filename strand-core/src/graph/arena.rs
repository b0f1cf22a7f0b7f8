//! Node Arena
//!
//! Owns every node of one runtime and the edges between them. Edges are kept
//! in both directions: a node's `sources` (what it read) and its `observers`
//! (who read it). The two sides are always updated together.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::node::{Computation, Node, NodeId, NodeKind, NodeState};

/// The dependency graph of one runtime.
pub(crate) struct Graph {
    nodes: IndexMap<NodeId, Node>,
    next_id: u64,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            next_id: 0,
        }
    }

    /// Add a node with no edges.
    pub(crate) fn insert(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_raw(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(kind));
        id
    }

    /// Remove a node and every edge touching it.
    ///
    /// The node is handed back so the caller can drop its computation after
    /// releasing the graph borrow.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.shift_remove(&id)?;

        for source in &node.sources {
            if let Some(source) = self.nodes.get_mut(source) {
                source.observers.shift_remove(&id);
            }
        }
        for observer in &node.observers {
            if let Some(observer) = self.nodes.get_mut(observer) {
                observer.sources.retain(|s| *s != id);
            }
        }

        Some(node)
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.nodes.iter()
    }

    pub(crate) fn set_computation(&mut self, id: NodeId, computation: Computation) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.computation = Some(computation);
        }
    }

    /// Replace the sources of `id` with the ones read during its latest run.
    ///
    /// Sources that were dropped lose `id` as an observer, new ones gain it.
    /// Does nothing if `id` was removed while it was running.
    pub(crate) fn relink(&mut self, id: NodeId, sources: SmallVec<[NodeId; 4]>) {
        let sources: SmallVec<[NodeId; 4]> = sources
            .into_iter()
            .filter(|s| self.nodes.contains_key(s))
            .collect();

        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let previous = std::mem::replace(&mut node.sources, sources.clone());

        for stale in previous.iter().filter(|s| !sources.contains(s)) {
            if let Some(source) = self.nodes.get_mut(stale) {
                source.observers.shift_remove(&id);
            }
        }
        for fresh in sources.iter().filter(|s| !previous.contains(s)) {
            if let Some(source) = self.nodes.get_mut(fresh) {
                source.observers.insert(id);
            }
        }
    }

    /// Mark every observer of a node as dirty.
    ///
    /// Used after a computed re-derived to a different value; its observers
    /// were already marked `Check` when the originating write happened.
    /// Observers that are running are skipped: they are pulling the new value
    /// right now.
    pub(crate) fn mark_observers_dirty(&mut self, id: NodeId) {
        let observers: SmallVec<[NodeId; 8]> = match self.nodes.get(&id) {
            Some(node) => node.observers.iter().copied().collect(),
            None => return,
        };
        for observer in observers {
            if let Some(node) = self.nodes.get_mut(&observer) {
                if !node.running {
                    node.mark_dirty();
                }
            }
        }
    }

    /// Propagate a change of `source` through the graph.
    ///
    /// Direct observers become `Dirty`, everything further downstream becomes
    /// `Check`. Returns the effects reached, in breadth-first order.
    pub(crate) fn mark_changed(&mut self, source: NodeId) -> Vec<NodeId> {
        let mut effects = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        let direct: SmallVec<[NodeId; 8]> = match self.nodes.get(&source) {
            Some(node) => node.observers.iter().copied().collect(),
            None => return effects,
        };
        for id in direct {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.mark_dirty();
                queue.push_back(id);
            }
        }

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            match node.kind {
                NodeKind::Effect => effects.push(id),
                NodeKind::Computed => {
                    let observers: SmallVec<[NodeId; 8]> =
                        node.observers.iter().copied().collect();
                    for observer in observers {
                        if let Some(node) = self.nodes.get_mut(&observer) {
                            node.mark_check();
                            queue.push_back(observer);
                        }
                    }
                }
                NodeKind::Signal => {}
            }
        }

        effects
    }

    pub(crate) fn state(&self, id: NodeId) -> Option<NodeState> {
        self.nodes.get(&id).map(|node| node.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(graph: &mut Graph, observer: NodeId, sources: &[NodeId]) {
        graph.relink(observer, sources.iter().copied().collect());
    }

    #[test]
    fn insert_and_remove_nodes() {
        let mut graph = Graph::new();
        let a = graph.insert(NodeKind::Signal);
        let b = graph.insert(NodeKind::Computed);
        assert_ne!(a, b);
        assert_eq!(graph.len(), 2);

        link(&mut graph, b, &[a]);
        assert!(graph.get(a).unwrap().observers.contains(&b));

        graph.remove(a);
        assert_eq!(graph.len(), 1);
        assert!(graph.get(b).unwrap().sources.is_empty());
    }

    #[test]
    fn relink_drops_stale_sources() {
        let mut graph = Graph::new();
        let a = graph.insert(NodeKind::Signal);
        let b = graph.insert(NodeKind::Signal);
        let e = graph.insert(NodeKind::Effect);

        link(&mut graph, e, &[a]);
        assert!(graph.get(a).unwrap().observers.contains(&e));

        link(&mut graph, e, &[b]);
        assert!(!graph.get(a).unwrap().observers.contains(&e));
        assert!(graph.get(b).unwrap().observers.contains(&e));
        assert_eq!(graph.get(e).unwrap().sources.as_slice(), &[b]);
    }

    #[test]
    fn relink_ignores_removed_observer() {
        let mut graph = Graph::new();
        let a = graph.insert(NodeKind::Signal);
        let e = graph.insert(NodeKind::Effect);
        graph.remove(e);

        link(&mut graph, e, &[a]);
        assert!(graph.get(a).unwrap().observers.is_empty());
    }

    #[test]
    fn mark_changed_colors_diamond() {
        // a -> b, a -> c, (b, c) -> d -> effect
        let mut graph = Graph::new();
        let a = graph.insert(NodeKind::Signal);
        let b = graph.insert(NodeKind::Computed);
        let c = graph.insert(NodeKind::Computed);
        let d = graph.insert(NodeKind::Computed);
        let e = graph.insert(NodeKind::Effect);
        link(&mut graph, b, &[a]);
        link(&mut graph, c, &[a]);
        link(&mut graph, d, &[b, c]);
        link(&mut graph, e, &[d]);

        let effects = graph.mark_changed(a);

        assert_eq!(effects, vec![e]);
        assert_eq!(graph.state(b), Some(NodeState::Dirty));
        assert_eq!(graph.state(c), Some(NodeState::Dirty));
        assert_eq!(graph.state(d), Some(NodeState::Check));
        assert_eq!(graph.state(e), Some(NodeState::Check));
    }

    #[test]
    fn observers_keep_subscription_order() {
        let mut graph = Graph::new();
        let a = graph.insert(NodeKind::Signal);
        let first = graph.insert(NodeKind::Effect);
        let second = graph.insert(NodeKind::Effect);
        let third = graph.insert(NodeKind::Effect);
        link(&mut graph, second, &[a]);
        link(&mut graph, first, &[a]);
        link(&mut graph, third, &[a]);

        assert_eq!(graph.mark_changed(a), vec![second, first, third]);
    }
}
