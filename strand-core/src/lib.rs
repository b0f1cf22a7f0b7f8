//! Strand Core
//!
//! A fine-grained reactive runtime: signals hold values, computeds derive
//! values from them, and effects run side effects whenever what they read
//! changes. Dependencies are discovered automatically from the reads a
//! computation performs.
//!
//! - Glitch-free: in a diamond `a -> (b, c) -> d`, a write to `a` re-derives
//!   `d` once, and `d` never sees a mix of old and new values.
//! - Lazy: a computed nobody reads is not re-derived.
//! - Batched: [`batch`] coalesces several writes into one effect pass.
//!
//! # Architecture
//!
//! - `reactive`: signals, computeds, effects, batches and the runtime that
//!   coordinates them
//! - `graph`: the dependency graph and its serializable snapshot
//! - `equals`: equality functions for values `PartialEq` gets wrong
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use strand_core::{batch, computed, effect, signal};
//!
//! // Create a signal
//! let count = signal(1);
//!
//! // Create a derived value
//! let doubled = computed({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let stop = effect({
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     move || log.borrow_mut().push(format!("{} {}", count.get(), doubled.get()))
//! });
//!
//! // Update the signal; the effect runs once per write
//! count.set(5);
//! batch(|| {
//!     count.set(6);
//!     count.set(7);
//! });
//!
//! assert_eq!(*log.borrow(), vec!["1 2", "5 10", "7 14"]);
//! stop.unsubscribe();
//! ```

mod config;
mod error;

pub mod equals;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{ConfigError, ReactiveError};
pub use graph::{GraphSnapshot, NodeId, NodeKind, NodeSnapshot, NodeState};
pub use reactive::{
    batch, computed, effect, signal, try_batch, try_effect, untrack, Cleanup, Computed,
    EffectOutput, Readable, Runtime, Signal, Unsubscribe,
};
