//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects. It owns the dependency graph, the tracking stack and the
//! queue of effects waiting to run.
//!
//! # How It Works
//!
//! 1. When a computed or effect runs, every tracked read is recorded, and the
//!    node's edges are replaced by the ones read in that run.
//!
//! 2. When a signal's value changes, the runtime:
//!    a. Marks its direct observers `Dirty` and everything downstream `Check`
//!    b. Queues every effect it reached
//!    c. Flushes the queue, unless a batch is open or a flush is already
//!       running further up the stack
//!
//! 3. Computeds are lazy: they re-derive when read, and only if one of their
//!    sources actually produced a new value. An effect is refreshed the same
//!    way when it leaves the queue, so it runs at most once per flush pass
//!    and never for a source that re-derived to an equal value.
//!
//! # Thread Confinement
//!
//! A runtime and every handle into it are `!Send`. Each thread gets its own
//! default runtime; [`Runtime::new`] creates additional, independent graphs.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexSet;
use tracing::{debug, trace, warn};

use super::batch::BatchGuard;
use super::context::{ReactiveContext, TrackingStack};
use super::effect::{EffectInner, EffectOutput};
use super::subscriber::Unsubscribe;
use crate::config::RuntimeConfig;
use crate::error::{capture, raise, ConfigError, ReactiveError};
use crate::graph::{Computation, Graph, GraphSnapshot, NodeId, NodeKind, NodeState};

/// A computation the runtime can re-run.
pub(crate) trait Reactive {
    /// Run the computation. Returns whether its observable value changed.
    fn run(&self, rt: &RuntimeInner) -> bool;

    /// Release resources. Called once when the node is disposed.
    fn dispose(&self) {}
}

thread_local! {
    static CURRENT: Runtime = Runtime::new();
}

/// Handle to one reactive graph.
///
/// Cloning is cheap and yields a handle to the same graph. Signals,
/// computeds and effects keep only a weak link to their runtime: once every
/// `Runtime` handle is gone, signals behave as plain cells and writes no
/// longer propagate.
///
/// # Example
///
/// ```rust
/// use strand_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(1);
/// let doubled = rt.computed({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create an independent runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create an independent runtime.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid. See
    /// [`try_with_config`](Self::try_with_config).
    pub fn with_config(config: RuntimeConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(rt) => rt,
            Err(err) => panic!("{err}"),
        }
    }

    /// Create an independent runtime, rejecting an invalid configuration.
    pub fn try_with_config(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Rc::new(RuntimeInner::new(config)),
        })
    }

    /// The calling thread's default runtime, used by the free functions.
    pub fn current() -> Self {
        CURRENT.with(Runtime::clone)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Create an effect, reporting a failure of its first run.
    ///
    /// If the first run panics, the effect is not installed.
    pub fn try_effect<F, R>(&self, run: F) -> Result<Unsubscribe, ReactiveError>
    where
        F: FnMut() -> R + 'static,
        R: EffectOutput,
    {
        let inner = &self.inner;
        let id = inner.create_node(NodeKind::Effect);
        let effect = Rc::new(EffectInner::new(id, run));
        let computation: Rc<dyn Reactive> = effect.clone();
        inner.attach(id, Computation::Effect(computation));
        debug!(effect = %id, "effect created");

        let first_run = {
            let _batch = BatchGuard::new(inner);
            capture(|| effect.run(inner))
        };
        if let Err(err) = first_run {
            inner.dispose_effect(id);
            return Err(err);
        }

        if let Err(err) = inner.flush() {
            inner.dispose_effect(id);
            return Err(err);
        }
        Ok(Unsubscribe::effect(Rc::downgrade(inner), id))
    }

    /// Create an effect that runs now and again whenever a dependency
    /// changes.
    ///
    /// # Panics
    ///
    /// Panics with the error message if the first run fails.
    pub fn effect<F, R>(&self, run: F) -> Unsubscribe
    where
        F: FnMut() -> R + 'static,
        R: EffectOutput,
    {
        match self.try_effect(run) {
            Ok(unsubscribe) => unsubscribe,
            Err(err) => panic!("{err}"),
        }
    }

    /// Run `f` with notifications deferred until the outermost batch exits.
    ///
    /// Each affected effect runs at most once when the batch is flushed.
    /// If `f` panics, the writes it made before panicking are still flushed
    /// and the panic is then resumed.
    pub fn try_batch<R>(&self, f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
        let out = {
            let _batch = BatchGuard::new(&self.inner);
            panic::catch_unwind(AssertUnwindSafe(f))
        };
        let flushed = self.inner.flush();
        match out {
            Ok(out) => flushed.map(|()| out),
            Err(payload) => {
                if let Err(err) = flushed {
                    warn!(error = %err, "flush after a panicking batch failed");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Like [`try_batch`](Self::try_batch), panicking if the flush fails.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.try_batch(f) {
            Ok(out) => out,
            Err(err) => panic!("{err}"),
        }
    }

    /// Run `f` without registering any reads as dependencies.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.untracked(f)
    }

    /// Whether a computed or effect is currently recording reads.
    pub fn is_tracking(&self) -> bool {
        self.inner.tracking.is_tracking()
    }

    /// Whether a batch is open.
    pub fn is_batching(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }

    /// Number of live signals, computeds and effects.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().len()
    }

    /// Capture the current dependency graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::capture(&self.inner.graph.borrow())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.node_count())
            .field("pending", &self.inner.pending.borrow().len())
            .field("batch_depth", &self.inner.batch_depth.get())
            .finish()
    }
}

/// Shared state behind a [`Runtime`] handle.
pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) graph: RefCell<Graph>,
    pub(crate) tracking: TrackingStack,

    /// Effects waiting to be refreshed, in the order they were reached.
    pending: RefCell<IndexSet<NodeId>>,
    pub(crate) batch_depth: Cell<usize>,
    write_depth: Cell<usize>,
    flushing: Cell<bool>,

    /// Nodes whose handles were dropped while the graph was borrowed.
    garbage: RefCell<Vec<NodeId>>,
}

impl RuntimeInner {
    pub(crate) fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            graph: RefCell::new(Graph::new()),
            tracking: TrackingStack::default(),
            pending: RefCell::new(IndexSet::new()),
            batch_depth: Cell::new(0),
            write_depth: Cell::new(0),
            flushing: Cell::new(false),
            garbage: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn create_node(&self, kind: NodeKind) -> NodeId {
        self.graph.borrow_mut().insert(kind)
    }

    pub(crate) fn attach(&self, id: NodeId, computation: Computation) {
        self.graph.borrow_mut().set_computation(id, computation);
    }

    /// Record a read of `id` by the running computation.
    pub(crate) fn track(&self, id: NodeId) {
        self.tracking.track(id);
    }

    /// Run `f` as the computation of node `id`, then replace the node's
    /// sources with the ones it read.
    ///
    /// If `f` panics the previous sources are kept.
    pub(crate) fn run_tracked<R>(&self, id: NodeId, kind: NodeKind, f: impl FnOnce() -> R) -> R {
        let ctx = ReactiveContext::enter(self, id, kind);
        let out = f();
        let sources = ctx.finish();
        self.graph.borrow_mut().relink(id, sources);
        out
    }

    pub(crate) fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _ctx = ReactiveContext::untracked(self);
        f()
    }

    /// Reject writes from inside a derivation.
    pub(crate) fn check_writable(&self, signal: NodeId) -> Result<(), ReactiveError> {
        match self.tracking.deriving_computed() {
            Some(computed) => Err(ReactiveError::WriteInComputed { signal, computed }),
            None => Ok(()),
        }
    }

    /// Open one level of write nesting.
    pub(crate) fn enter_write(&self) -> Result<WriteGuard<'_>, ReactiveError> {
        let depth = self.write_depth.get() + 1;
        if depth > self.config.max_write_depth {
            warn!(limit = self.config.max_write_depth, "signal write nesting limit hit");
            return Err(ReactiveError::DepthExceeded {
                limit: self.config.max_write_depth,
            });
        }
        self.write_depth.set(depth);
        Ok(WriteGuard { rt: self })
    }

    /// Propagate a committed change of `id` and queue the effects it reaches.
    pub(crate) fn mark_changed(&self, id: NodeId) {
        let effects = self.graph.borrow_mut().mark_changed(id);
        trace!(source = %id, effects = effects.len(), "change propagated");
        self.pending.borrow_mut().extend(effects);
    }

    /// Bring a computed or effect up to date, re-running it if one of its
    /// sources changed.
    ///
    /// Reading a computed that is already running is a cycle and unwinds
    /// with [`ReactiveError::Cycle`].
    pub(crate) fn refresh(&self, id: NodeId) {
        let (kind, state, running) = match self.graph.borrow().get(id) {
            Some(node) => (node.kind, node.state, node.running),
            None => return,
        };
        if running {
            if kind == NodeKind::Computed {
                warn!(computed = %id, "cycle detected");
                raise(ReactiveError::Cycle { node: id });
            }
            return;
        }

        match state {
            NodeState::Clean => return,
            NodeState::Check => {
                let sources = match self.graph.borrow().get(id) {
                    Some(node) => node.sources.clone(),
                    None => return,
                };
                for source in sources {
                    let is_computed =
                        self.graph.borrow().get(source).map(|node| node.kind) == Some(NodeKind::Computed);
                    if is_computed {
                        self.refresh(source);
                    }
                    if self.graph.borrow().state(id) == Some(NodeState::Dirty) {
                        break;
                    }
                }
            }
            NodeState::Dirty => {}
        }

        let dirty = self.graph.borrow().state(id) == Some(NodeState::Dirty);
        if dirty {
            self.execute(id, kind);
        } else if let Some(node) = self.graph.borrow_mut().get_mut(id) {
            node.state = NodeState::Clean;
        }
    }

    fn execute(&self, id: NodeId, kind: NodeKind) {
        let computation = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return;
            };
            node.state = NodeState::Clean;
            node.computation.as_ref().and_then(Computation::upgrade)
        };
        let Some(computation) = computation else {
            return;
        };

        trace!(node = %id, ?kind, "re-running");
        match panic::catch_unwind(AssertUnwindSafe(|| computation.run(self))) {
            Ok(true) => self.graph.borrow_mut().mark_observers_dirty(id),
            Ok(false) => {}
            Err(payload) => {
                // A failed derivation is retried on the next read.
                if kind == NodeKind::Computed {
                    if let Some(node) = self.graph.borrow_mut().get_mut(id) {
                        node.mark_dirty();
                    }
                }
                panic::resume_unwind(payload);
            }
        }
    }

    /// Run queued effects until the queue is empty.
    ///
    /// Does nothing inside a batch or when a flush is already running further
    /// up the stack; that flush picks up whatever is queued now.
    pub(crate) fn flush(&self) -> Result<(), ReactiveError> {
        if self.flushing.get() || self.batch_depth.get() > 0 {
            return Ok(());
        }
        let _flushing = FlushGuard::new(self);

        let mut runs: HashMap<NodeId, usize> = HashMap::new();
        let mut errors = Vec::new();

        loop {
            let next = self.pending.borrow_mut().shift_remove_index(0);
            let Some(id) = next else {
                break;
            };

            let count = runs.entry(id).or_insert(0);
            *count += 1;
            if *count > self.config.max_effect_runs {
                // The effect stays dirty and is not run again in this pass.
                if *count == self.config.max_effect_runs + 1 {
                    warn!(effect = %id, limit = self.config.max_effect_runs, "runaway effect stopped");
                    errors.push(ReactiveError::RunawayEffect {
                        node: id,
                        limit: self.config.max_effect_runs,
                    });
                }
                if !self.config.isolate_dependents {
                    break;
                }
                continue;
            }

            if let Err(err) = capture(|| self.refresh(id)) {
                warn!(effect = %id, error = %err, "effect failed");
                errors.push(err);
                if !self.config.isolate_dependents {
                    break;
                }
            }
        }

        if !runs.is_empty() {
            debug!(effects = runs.len(), failed = errors.len(), "flush complete");
        }
        self.collect_garbage();
        ReactiveError::collect(errors)
    }

    /// Stop an effect: dequeue it, detach it and run its final cleanup.
    pub(crate) fn dispose_effect(&self, id: NodeId) {
        self.pending.borrow_mut().shift_remove(&id);
        let node = self.graph.borrow_mut().remove(id);
        let Some(node) = node else {
            return;
        };
        debug!(effect = %id, "effect disposed");
        if let Some(computation) = node.computation.as_ref().and_then(Computation::upgrade) {
            computation.dispose();
        }
    }

    /// Forget a node whose last handle was dropped.
    pub(crate) fn release(&self, id: NodeId) {
        match self.graph.try_borrow_mut() {
            Ok(mut graph) => {
                let node = graph.remove(id);
                drop(graph);
                drop(node);
            }
            Err(_) => self.garbage.borrow_mut().push(id),
        }
    }

    fn collect_garbage(&self) {
        let ids = std::mem::take(&mut *self.garbage.borrow_mut());
        for id in ids {
            let node = self.graph.borrow_mut().remove(id);
            drop(node);
        }
    }

    pub(crate) fn open_batch(&self) {
        self.batch_depth.set(self.batch_depth.get() + 1);
    }

    pub(crate) fn close_batch(&self) {
        self.batch_depth.set(self.batch_depth.get().saturating_sub(1));
    }
}

/// One level of write nesting. Dropping it closes the level.
pub(crate) struct WriteGuard<'a> {
    rt: &'a RuntimeInner,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.rt.write_depth.set(self.rt.write_depth.get().saturating_sub(1));
    }
}

struct FlushGuard<'a> {
    rt: &'a RuntimeInner,
}

impl<'a> FlushGuard<'a> {
    fn new(rt: &'a RuntimeInner) -> Self {
        rt.flushing.set(true);
        Self { rt }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.rt.flushing.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn runtimes_are_independent() {
        let rt1 = Runtime::new();
        let rt2 = Runtime::new();

        let a = rt1.signal(1);
        let _b = rt2.signal(1);
        let _c = rt2.signal(1);

        assert_eq!(rt1.node_count(), 1);
        assert_eq!(rt2.node_count(), 2);
        drop(a);
        assert_eq!(rt1.node_count(), 0);
    }

    #[test]
    fn current_runtime_is_per_thread() {
        let rt = Runtime::current();
        let _a = rt.signal(0);
        let before = rt.node_count();

        std::thread::spawn(|| {
            let other = Runtime::current();
            assert_eq!(other.node_count(), 0);
        })
        .join()
        .unwrap();

        assert_eq!(Runtime::current().node_count(), before);
    }

    #[test]
    fn untrack_hides_reads() {
        let rt = Runtime::new();
        let a = rt.signal(1);
        let runs = Rc::new(Cell::new(0));

        let _effect = rt.effect({
            let rt = rt.clone();
            let a = a.clone();
            let runs = runs.clone();
            move || {
                assert!(rt.is_tracking());
                rt.untrack(|| {
                    assert!(!rt.is_tracking());
                    a.get()
                });
                runs.set(runs.get() + 1);
            }
        });

        a.set(2);
        assert_eq!(runs.get(), 1);
        assert!(rt.snapshot().node(a.id()).unwrap().observers.is_empty());
    }

    #[test]
    fn flush_reports_failures_after_running_siblings() {
        let rt = Runtime::new();
        let a = rt.signal(0);
        let seen = Rc::new(Cell::new(0));

        let _failing = rt.effect({
            let a = a.clone();
            move || {
                if a.get() > 0 {
                    panic!("effect failed on {}", a.peek());
                }
            }
        });
        let _sibling = rt.effect({
            let a = a.clone();
            let seen = seen.clone();
            move || seen.set(a.get())
        });

        let err = a.try_set(3).unwrap_err();
        assert_eq!(
            err,
            ReactiveError::Panicked {
                message: "effect failed on 3".to_string()
            }
        );
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn without_isolation_first_failure_stops_the_pass() {
        let rt = Runtime::with_config(RuntimeConfig {
            isolate_dependents: false,
            ..RuntimeConfig::default()
        });
        let a = rt.signal(0);
        let seen = Rc::new(Cell::new(0));

        let _failing = rt.effect({
            let a = a.clone();
            move || {
                if a.get() == 1 {
                    panic!("first");
                }
            }
        });
        let _sibling = rt.effect({
            let a = a.clone();
            let seen = seen.clone();
            move || seen.set(a.get())
        });

        assert!(a.try_set(1).is_err());
        assert_eq!(seen.get(), 0);

        // The skipped effect is still queued and runs on the next flush.
        a.set(2);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn runaway_effect_is_stopped() {
        let rt = Runtime::with_config(RuntimeConfig {
            max_effect_runs: 10,
            ..RuntimeConfig::default()
        });
        let a = rt.signal(0);
        let unsubscribe = rt.effect({
            let a = a.clone();
            move || {
                let _ = a.get();
            }
        });

        let _feedback = rt.effect({
            let a = a.clone();
            let armed = Rc::new(Cell::new(false));
            move || {
                let value = a.get();
                if armed.replace(true) {
                    let _ = a.try_set(value + 1);
                }
            }
        });

        // Both effects are re-queued by every feedback write; each is stopped
        // once it reaches the limit.
        let err = a.try_set(1).unwrap_err();
        let ReactiveError::Multiple(errors) = err else {
            panic!("expected one error per stopped effect, got {err:?}");
        };
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|err| matches!(err, ReactiveError::RunawayEffect { limit: 10, .. })));
        unsubscribe.unsubscribe();
    }

    #[test]
    fn runaway_effect_does_not_starve_siblings() {
        let rt = Runtime::with_config(RuntimeConfig {
            max_effect_runs: 5,
            ..RuntimeConfig::default()
        });
        let x = rt.signal(0);
        let y = rt.signal(0);
        let seen = Rc::new(Cell::new(-1));

        let _runaway = rt.effect({
            let (x, y) = (x.clone(), y.clone());
            move || {
                let value = x.get();
                if value > 0 {
                    let _ = x.try_set(value + 1);
                    let _ = y.try_set(value + 1);
                }
            }
        });
        let _sibling = rt.effect({
            let (y, seen) = (y.clone(), seen.clone());
            move || seen.set(y.get())
        });

        let err = x.try_set(1).unwrap_err();
        assert!(matches!(err, ReactiveError::RunawayEffect { limit: 5, .. }));
        assert!(y.peek() > 0);
        assert_eq!(seen.get(), y.peek());
    }

    #[test]
    fn panicking_batch_still_flushes_its_writes() {
        let rt = Runtime::new();
        let a = rt.signal(0);
        let seen = Rc::new(Cell::new(0));
        let _effect = rt.effect({
            let (a, seen) = (a.clone(), seen.clone());
            move || seen.set(a.get())
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            rt.batch(|| {
                a.set(7);
                panic!("batch body failed");
            })
        }));

        assert!(result.is_err());
        assert!(!rt.is_batching());
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RuntimeConfig {
            max_write_depth: 0,
            ..RuntimeConfig::default()
        };
        let err = Runtime::try_with_config(config.clone()).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLimit("max_write_depth")));

        let result = panic::catch_unwind(|| Runtime::with_config(config));
        assert!(result.is_err());
    }

    #[test]
    fn debug_shows_counts() {
        let rt = Runtime::new();
        let _a = rt.signal(1);
        let text = format!("{rt:?}");
        assert!(text.contains("nodes: 1"));
    }
}
