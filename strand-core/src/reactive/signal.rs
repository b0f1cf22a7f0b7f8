//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal registers that context as an observer.
//!
//! 2. When a signal is written with a value that differs from the current
//!    one, the new value is committed first, then observers are invalidated
//!    and plain `subscribe` callbacks are called.
//!
//! 3. Writing an equal value is a no-op: nothing is notified.
//!
//! # Equality
//!
//! Signals compare with [`equals::value_eq`](crate::equals::value_eq) by
//! default: `PartialEq`, with `NaN` equal to `NaN`, so writing back the
//! current value never notifies. Use [`Runtime::signal_with_equals`] with one
//! of the functions in [`equals`](crate::equals) for other semantics, such as
//! telling `0.0` and `-0.0` apart.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{trace, warn};

use super::runtime::{Runtime, RuntimeInner};
use super::subscriber::Unsubscribe;
use crate::equals;
use crate::error::{capture, ReactiveError};
use crate::graph::{NodeId, NodeKind};

type Listener<T> = Rc<dyn Fn(&T)>;

struct SignalInner<T> {
    rt: Weak<RuntimeInner>,
    id: NodeId,
    value: RefCell<T>,
    equals: Box<dyn Fn(&T, &T) -> bool>,
    listeners: RefCell<Vec<(u64, Listener<T>)>>,
    next_listener: Cell<u64>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.release(self.id);
        }
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Clones share the same cell.
///
/// # Example
///
/// ```rust
/// use strand_core::signal;
///
/// let count = signal(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies dependents)
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.peek(), 6);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    pub(crate) fn new_in(
        rt: &Rc<RuntimeInner>,
        value: T,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        let id = rt.create_node(NodeKind::Signal);
        Self {
            inner: Rc::new(SignalInner {
                rt: Rc::downgrade(rt),
                id,
                value: RefCell::new(value),
                equals: Box::new(equals),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    /// The signal's node in its runtime's graph.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Borrow the value, registering the running computation as a
    /// dependent.
    ///
    /// The signal must not be written from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if let Some(rt) = self.inner.rt.upgrade() {
            rt.track(self.inner.id);
        }
        f(&self.inner.value.borrow())
    }

    /// Borrow the value without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Write a new value.
    ///
    /// If it equals the current value nothing happens. Otherwise the value is
    /// committed, dependents are invalidated, `subscribe` callbacks are
    /// called, and queued effects run unless a batch is open.
    ///
    /// The value stays committed even if a dependent fails; the failure is
    /// returned.
    pub fn try_set(&self, value: T) -> Result<(), ReactiveError>
    where
        T: Clone,
    {
        let id = self.inner.id;
        let Some(rt) = self.inner.rt.upgrade() else {
            return match self.commit(value)? {
                true => self.notify_listeners(None),
                false => Ok(()),
            };
        };
        rt.check_writable(id)?;
        let depth = rt.enter_write()?;

        if !self.commit(value)? {
            return Ok(());
        }
        trace!(signal = %id, "signal written");

        rt.mark_changed(id);
        let listeners = self.notify_listeners(Some(&rt));
        drop(depth);

        let flushed = rt.flush();
        match (listeners, flushed) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Err(first), Err(second)) => Err(ReactiveError::Multiple(vec![first, second])),
        }
    }

    /// Write a new value.
    ///
    /// # Panics
    ///
    /// Panics with the error message if [`try_set`](Self::try_set) fails:
    /// a dependent failed, a cycle was detected, or the write happened
    /// inside a computed.
    pub fn set(&self, value: T)
    where
        T: Clone,
    {
        if let Err(err) = self.try_set(value) {
            panic!("{err}");
        }
    }

    /// Write the result of `f` applied to the current value.
    ///
    /// The current value is read without tracking.
    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<(), ReactiveError>
    where
        T: Clone,
    {
        let next = self.with_untracked(f);
        self.try_set(next)
    }

    /// Write the result of `f` applied to the current value.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: Clone,
    {
        if let Err(err) = self.try_update(f) {
            panic!("{err}");
        }
    }

    /// Call `f` with every new value until the returned handle is used.
    ///
    /// The callback is not a tracked computation: reads inside it create no
    /// dependencies. It is called synchronously on every change, also inside
    /// batches.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Unsubscribe {
        let key = self.inner.next_listener.get();
        self.inner.next_listener.set(key + 1);
        self.inner.listeners.borrow_mut().push((key, Rc::new(f)));

        let weak = Rc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(k, _)| *k != key);
            }
        })
    }

    /// Number of computeds, effects and callbacks depending on this signal.
    pub fn subscriber_count(&self) -> usize {
        let listeners = self.inner.listeners.borrow().len();
        let Some(rt) = self.inner.rt.upgrade() else {
            return listeners;
        };
        let graph = rt.graph.borrow();
        let observers = graph.get(self.inner.id).map_or(0, |node| node.observers.len());
        observers + listeners
    }

    /// Store `value` unless it equals the current one. Returns whether it
    /// was stored.
    fn commit(&self, value: T) -> Result<bool, ReactiveError> {
        let mut slot = self
            .inner
            .value
            .try_borrow_mut()
            .map_err(|_| ReactiveError::ValueBorrowed { node: self.inner.id })?;
        if (self.inner.equals)(&slot, &value) {
            return Ok(false);
        }
        *slot = value;
        Ok(true)
    }

    fn notify_listeners(&self, rt: Option<&RuntimeInner>) -> Result<(), ReactiveError>
    where
        T: Clone,
    {
        let listeners: SmallVec<[Listener<T>; 4]> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return Ok(());
        }

        let value = self.inner.value.borrow().clone();
        let isolate = rt.map_or(true, |rt| rt.config.isolate_dependents);
        let mut errors = Vec::new();
        for listener in listeners {
            let result = capture(|| match rt {
                Some(rt) => rt.untracked(|| listener(&value)),
                None => listener(&value),
            });
            if let Err(err) = result {
                warn!(signal = %self.inner.id, error = %err, "subscriber failed");
                errors.push(err);
                if !isolate {
                    break;
                }
            }
        }
        ReactiveError::collect(errors)
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Read the value, registering the running computation as a dependent.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Read the value without registering a dependency.
    pub fn peek(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl Runtime {
    /// Create a signal compared with [`equals::value_eq`].
    pub fn signal<T: PartialEq + 'static>(&self, value: T) -> Signal<T> {
        Signal::new_in(&self.inner, value, equals::value_eq)
    }

    /// Create a signal with a custom equality check.
    ///
    /// A write is ignored when `equals(current, new)` returns `true`.
    pub fn signal_with_equals<T: 'static>(
        &self,
        value: T,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Signal<T> {
        Signal::new_in(&self.inner, value, equals)
    }
}

/// Create a signal on the calling thread's default runtime.
pub fn signal<T: PartialEq + 'static>(value: T) -> Signal<T> {
    Runtime::current().signal(value)
}
