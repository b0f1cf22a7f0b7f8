//! Computed Implementation
//!
//! A Computed is a cached derived value. It is derived once when created and
//! re-derived only when one of the values it read has changed.
//!
//! # How Computeds Work
//!
//! 1. On creation, the derivation runs under tracking and the result is
//!    cached, so the first read is already warm.
//!
//! 2. When a dependency changes, the computed is marked `Dirty` (a signal it
//!    read changed) or `Check` (something further upstream changed).
//!
//! 3. On the next read, a `Check` computed first refreshes its own computed
//!    sources; it re-derives only if one of them produced a new value.
//!
//! 4. If the re-derived value equals the cached one, observers are not
//!    invalidated.
//!
//! Refreshing in source order means each computed re-derives at most once
//! per change, however many paths lead to it from the changed signal.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::runtime::{Reactive, Runtime, RuntimeInner};
use super::subscriber::Unsubscribe;
use crate::equals;
use crate::error::{raise, ReactiveError};
use crate::graph::{Computation, NodeId, NodeKind};

struct ComputedInner<T> {
    rt: Weak<RuntimeInner>,
    id: NodeId,
    derive: Box<dyn Fn() -> T>,
    value: RefCell<T>,
    equals: Box<dyn Fn(&T, &T) -> bool>,
}

impl<T> Reactive for ComputedInner<T> {
    fn run(&self, rt: &RuntimeInner) -> bool {
        let next = rt.run_tracked(self.id, NodeKind::Computed, || (self.derive)());
        let changed = !(self.equals)(&self.value.borrow(), &next);
        if changed {
            match self.value.try_borrow_mut() {
                Ok(mut slot) => *slot = next,
                Err(_) => raise(ReactiveError::ValueBorrowed { node: self.id }),
            }
        }
        changed
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.release(self.id);
        }
    }
}

/// A read-only value derived from other signals and computeds.
///
/// Clones share the same cached value.
///
/// # Example
///
/// ```rust
/// use strand_core::{computed, signal};
///
/// let a = signal(1);
/// let b = computed({
///     let a = a.clone();
///     move || a.get() * 2
/// });
///
/// a.set(5);
/// assert_eq!(b.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: 'static> Computed<T> {
    fn new_in(
        rt: &Rc<RuntimeInner>,
        derive: impl Fn() -> T + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        let id = rt.create_node(NodeKind::Computed);
        let first = panic::catch_unwind(AssertUnwindSafe(|| {
            rt.run_tracked(id, NodeKind::Computed, &derive)
        }));
        let value = match first {
            Ok(value) => value,
            Err(payload) => {
                rt.release(id);
                panic::resume_unwind(payload);
            }
        };

        let inner = Rc::new(ComputedInner {
            rt: Rc::downgrade(rt),
            id,
            derive: Box::new(derive),
            value: RefCell::new(value),
            equals: Box::new(equals),
        });
        let weak = Rc::downgrade(&inner);
        let weak: Weak<dyn Reactive> = weak;
        rt.attach(id, Computation::Derived(weak));
        Self { inner }
    }

    /// The computed's node in its runtime's graph.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Borrow the up-to-date value, registering the running computation as a
    /// dependent.
    ///
    /// The computed must not be re-derived from inside `f`: a write in `f`
    /// whose effects read this computed fails with
    /// [`ReactiveError::ValueBorrowed`](crate::ReactiveError::ValueBorrowed).
    ///
    /// # Panics
    ///
    /// Panics with [`ReactiveError::Cycle`](crate::ReactiveError::Cycle) as
    /// payload if the computed is read while it is deriving, and propagates
    /// a panic of the derivation.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if let Some(rt) = self.inner.rt.upgrade() {
            rt.refresh(self.inner.id);
            rt.track(self.inner.id);
        }
        f(&self.inner.value.borrow())
    }

    /// Borrow the up-to-date value without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if let Some(rt) = self.inner.rt.upgrade() {
            rt.refresh(self.inner.id);
        }
        f(&self.inner.value.borrow())
    }

    /// Number of computeds and effects that read this value.
    pub fn observer_count(&self) -> usize {
        let Some(rt) = self.inner.rt.upgrade() else {
            return 0;
        };
        let graph = rt.graph.borrow();
        graph.get(self.inner.id).map_or(0, |node| node.observers.len())
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Read the up-to-date value, registering the running computation as a
    /// dependent.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Read the up-to-date value without registering a dependency.
    pub fn peek(&self) -> T {
        self.with_untracked(T::clone)
    }

    /// Call `f` with every new value until the returned handle is used.
    ///
    /// Delivered through an effect, so notifications inside a batch arrive
    /// once, after the batch.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Unsubscribe {
        let Some(rt) = self.inner.rt.upgrade() else {
            return Unsubscribe::new(|| {});
        };
        let weak = Rc::downgrade(&rt);
        let this = self.clone();
        let mut first = true;
        Runtime { inner: rt }.effect(move || {
            let value = this.get();
            if std::mem::replace(&mut first, false) {
                return;
            }
            match weak.upgrade() {
                Some(rt) => rt.untracked(|| f(&value)),
                None => f(&value),
            }
        })
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

impl Runtime {
    /// Create a computed compared with [`equals::value_eq`].
    ///
    /// The derivation runs once immediately. It must not write signals.
    pub fn computed<T: PartialEq + 'static>(&self, derive: impl Fn() -> T + 'static) -> Computed<T> {
        Computed::new_in(&self.inner, derive, equals::value_eq)
    }

    /// Create a computed with a custom equality check.
    ///
    /// Observers are invalidated only when `equals(old, new)` is `false`.
    pub fn computed_with_equals<T: 'static>(
        &self,
        derive: impl Fn() -> T + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Computed<T> {
        Computed::new_in(&self.inner, derive, equals)
    }
}

/// Create a computed on the calling thread's default runtime.
pub fn computed<T: PartialEq + 'static>(derive: impl Fn() -> T + 'static) -> Computed<T> {
    Runtime::current().computed(derive)
}
