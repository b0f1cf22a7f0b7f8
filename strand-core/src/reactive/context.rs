//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each runtime owns a stack of frames. Running a computed or effect pushes a
//! frame for it; every tracked read while that frame is on top is recorded as
//! one of its sources. When the computation completes, the frame is popped
//! and the collected sources replace the node's previous ones.
//!
//! The stack supports nested contexts (a computed read from inside an effect
//! pulls and runs with its own frame) and untracked scopes, which push a
//! frame that records nothing.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::runtime::RuntimeInner;
use crate::graph::{NodeId, NodeKind};

/// One level of the tracking stack.
#[derive(Debug, Clone)]
struct Frame {
    /// The running computation, or `None` for an untracked scope.
    observer: Option<(NodeId, NodeKind)>,
    /// Sources read so far, without duplicates, in first-read order.
    sources: SmallVec<[NodeId; 4]>,
}

/// The per-runtime stack of running computations.
#[derive(Debug, Default)]
pub(crate) struct TrackingStack {
    frames: RefCell<Vec<Frame>>,
}

impl TrackingStack {
    fn push(&self, observer: Option<(NodeId, NodeKind)>) {
        self.frames.borrow_mut().push(Frame {
            observer,
            sources: SmallVec::new(),
        });
    }

    fn pop(&self) -> Option<Frame> {
        self.frames.borrow_mut().pop()
    }

    /// Record a read of `source` by the innermost computation, if any.
    pub(crate) fn track(&self, source: NodeId) {
        let mut frames = self.frames.borrow_mut();
        if let Some(frame) = frames.last_mut() {
            if frame.observer.is_some() && !frame.sources.contains(&source) {
                frame.sources.push(source);
            }
        }
    }

    /// The computation reads are currently attributed to.
    pub(crate) fn current(&self) -> Option<NodeId> {
        self.frames
            .borrow()
            .last()
            .and_then(|frame| frame.observer.map(|(id, _)| id))
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.current().is_some()
    }

    /// The innermost computed on the stack, even below an untracked scope.
    pub(crate) fn deriving_computed(&self) -> Option<NodeId> {
        self.frames
            .borrow()
            .iter()
            .rev()
            .find_map(|frame| match frame.observer {
                Some((id, NodeKind::Computed)) => Some(id),
                _ => None,
            })
    }
}

/// Guard for one frame on the tracking stack.
///
/// While a guard for a computation is alive, its node is flagged as running.
/// Dropping the guard pops the frame, so the stack stays balanced even if the
/// computation panics.
pub(crate) struct ReactiveContext<'a> {
    rt: &'a RuntimeInner,
    observer: Option<NodeId>,
    finished: bool,
}

impl<'a> ReactiveContext<'a> {
    /// Enter a tracked context for the given computation.
    pub(crate) fn enter(rt: &'a RuntimeInner, observer: NodeId, kind: NodeKind) -> Self {
        rt.tracking.push(Some((observer, kind)));
        if let Some(node) = rt.graph.borrow_mut().get_mut(observer) {
            node.running = true;
        }
        Self {
            rt,
            observer: Some(observer),
            finished: false,
        }
    }

    /// Enter a scope in which reads are not tracked.
    pub(crate) fn untracked(rt: &'a RuntimeInner) -> Self {
        rt.tracking.push(None);
        Self {
            rt,
            observer: None,
            finished: false,
        }
    }

    /// Leave the context and return the sources read inside it.
    pub(crate) fn finish(mut self) -> SmallVec<[NodeId; 4]> {
        self.finished = true;
        self.exit().map(|frame| frame.sources).unwrap_or_default()
    }

    fn exit(&self) -> Option<Frame> {
        let popped = self.rt.tracking.pop();
        if let Some(frame) = &popped {
            // Catch mismatched enter/exit pairs.
            debug_assert_eq!(
                frame.observer.map(|(id, _)| id),
                self.observer,
                "ReactiveContext mismatch"
            );
        }
        if let Some(id) = self.observer {
            if let Some(node) = self.rt.graph.borrow_mut().get_mut(id) {
                node.running = false;
            }
        }
        popped
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    #[test]
    fn context_tracks_current_observer() {
        let rt = RuntimeInner::new(RuntimeConfig::default());
        let id = rt.graph.borrow_mut().insert(NodeKind::Effect);

        assert!(!rt.tracking.is_tracking());
        {
            let _ctx = ReactiveContext::enter(&rt, id, NodeKind::Effect);
            assert_eq!(rt.tracking.current(), Some(id));
            assert!(rt.graph.borrow().get(id).unwrap().running);
        }

        // Context should be cleaned up after drop
        assert!(rt.tracking.current().is_none());
        assert!(!rt.graph.borrow().get(id).unwrap().running);
    }

    #[test]
    fn context_collects_sources_once() {
        let rt = RuntimeInner::new(RuntimeConfig::default());
        let observer = rt.graph.borrow_mut().insert(NodeKind::Computed);
        let a = NodeId::from_raw(100);
        let b = NodeId::from_raw(101);

        let ctx = ReactiveContext::enter(&rt, observer, NodeKind::Computed);
        rt.tracking.track(a);
        rt.tracking.track(b);
        rt.tracking.track(a);

        assert_eq!(ctx.finish().as_slice(), &[a, b]);
    }

    #[test]
    fn nested_and_untracked_contexts() {
        let rt = RuntimeInner::new(RuntimeConfig::default());
        let outer = rt.graph.borrow_mut().insert(NodeKind::Computed);
        let inner = rt.graph.borrow_mut().insert(NodeKind::Effect);

        let outer_ctx = ReactiveContext::enter(&rt, outer, NodeKind::Computed);
        {
            let inner_ctx = ReactiveContext::enter(&rt, inner, NodeKind::Effect);
            assert_eq!(rt.tracking.current(), Some(inner));
            rt.tracking.track(NodeId::from_raw(9));
            assert_eq!(inner_ctx.finish().len(), 1);
        }
        {
            let _untracked = ReactiveContext::untracked(&rt);
            assert!(!rt.tracking.is_tracking());
            assert_eq!(rt.tracking.deriving_computed(), Some(outer));
            rt.tracking.track(NodeId::from_raw(10));
        }

        // After the inner contexts, the outer one is current again and saw
        // none of their reads.
        assert_eq!(rt.tracking.current(), Some(outer));
        assert!(outer_ctx.finish().is_empty());
    }
}
