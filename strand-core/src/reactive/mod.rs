//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds and
//! effects, plus batching.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a computed or an effect), the signal registers
//! that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-derives only
//! when one of its dependencies produced a new value, and at most once per
//! write however many paths lead to it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. It may return a cleanup that runs before the next run
//! and when the effect is stopped.
//!
//! ## Batches
//!
//! A batch defers effects until the outermost batch exits, so an effect that
//! depends on several written signals runs once.
//!
//! # Implementation Notes
//!
//! Each runtime keeps a stack of running computations. When a signal is read,
//! the computation on top of the stack (if any) records the read. After the
//! computation finishes, the recorded reads become its edges in the graph.

mod batch;
mod computed;
mod context;
mod effect;
mod readable;
mod runtime;
mod signal;
mod subscriber;

pub use batch::{batch, try_batch, untrack};
pub use computed::{computed, Computed};
pub use effect::{effect, try_effect, Cleanup, EffectOutput};
pub use readable::Readable;
pub use runtime::Runtime;
pub(crate) use runtime::Reactive;
pub use signal::{signal, Signal};
pub use subscriber::Unsubscribe;
