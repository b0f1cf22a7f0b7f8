//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued and refreshed once
//!    the write (or the outermost batch) completes.
//!
//! 3. Every run records a fresh set of dependencies, so an effect that reads
//!    different signals depending on a condition follows the condition.
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It is called before the
//! effect re-runs and when the effect is unsubscribed, exactly once per run.

use std::cell::{Cell, RefCell};
use std::fmt;

use super::runtime::{Reactive, Runtime, RuntimeInner};
use super::subscriber::Unsubscribe;
use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeKind};

/// Teardown returned by an effect run.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    fn call(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// What an effect function may return.
pub trait EffectOutput {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl EffectOutput for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl EffectOutput for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

/// State of one effect. Owned by the graph until the effect is disposed.
pub(crate) struct EffectInner {
    id: NodeId,
    run: RefCell<Box<dyn FnMut() -> Option<Cleanup>>>,
    cleanup: RefCell<Option<Cleanup>>,
    disposed: Cell<bool>,
}

impl EffectInner {
    pub(crate) fn new<F, R>(id: NodeId, mut run: F) -> Self
    where
        F: FnMut() -> R + 'static,
        R: EffectOutput,
    {
        Self {
            id,
            run: RefCell::new(Box::new(move || run().into_cleanup())),
            cleanup: RefCell::new(None),
            disposed: Cell::new(false),
        }
    }

    fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup.call();
        }
    }
}

impl Reactive for EffectInner {
    fn run(&self, rt: &RuntimeInner) -> bool {
        if self.disposed.get() {
            return false;
        }
        self.run_cleanup();

        let cleanup = rt.run_tracked(self.id, NodeKind::Effect, || {
            let mut run = self.run.borrow_mut();
            (&mut **run)()
        });

        // The effect may have unsubscribed itself while running.
        if self.disposed.get() {
            if let Some(cleanup) = cleanup {
                cleanup.call();
            }
        } else {
            *self.cleanup.borrow_mut() = cleanup;
        }
        false
    }

    fn dispose(&self) {
        if !self.disposed.replace(true) {
            self.run_cleanup();
        }
    }
}

/// Create an effect on the calling thread's default runtime.
///
/// The effect runs once now and again whenever something it read changes,
/// until the returned handle is used to unsubscribe.
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use strand_core::{effect, signal};
///
/// let count = signal(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let stop = effect({
///     let (count, seen) = (count.clone(), seen.clone());
///     move || seen.set(count.get())
/// });
/// count.set(3);
/// assert_eq!(seen.get(), 3);
///
/// stop.unsubscribe();
/// count.set(4);
/// assert_eq!(seen.get(), 3);
/// ```
pub fn effect<F, R>(run: F) -> Unsubscribe
where
    F: FnMut() -> R + 'static,
    R: EffectOutput,
{
    Runtime::current().effect(run)
}

/// Create an effect on the calling thread's default runtime, reporting a
/// failure of its first run.
pub fn try_effect<F, R>(run: F) -> Result<Unsubscribe, ReactiveError>
where
    F: FnMut() -> R + 'static,
    R: EffectOutput,
{
    Runtime::current().try_effect(run)
}
