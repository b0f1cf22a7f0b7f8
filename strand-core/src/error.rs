//! Error Types
//!
//! Failures surfaced by the reactive runtime. Writes, batches and effect
//! creation have `try_*` variants that return these; the plain variants panic
//! with the error's message.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::graph::NodeId;

/// Error raised while propagating a change through the reactive graph.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ReactiveError {
    /// A computed read its own value, directly or through other computeds.
    #[error("cycle detected: computed {node} depends on its own value")]
    Cycle {
        /// The computed that was re-entered.
        node: NodeId,
    },

    /// An effect kept invalidating itself inside a single flush.
    #[error("effect {node} re-ran more than {limit} times in one flush")]
    RunawayEffect {
        /// The effect that was stopped.
        node: NodeId,
        /// The configured per-flush run limit.
        limit: usize,
    },

    /// Signal writes nested deeper than the configured limit.
    #[error("signal writes nested more than {limit} levels deep")]
    DepthExceeded {
        /// The configured nesting limit.
        limit: usize,
    },

    /// A signal was written while a computed was deriving its value.
    #[error("signal {signal} written while computed {computed} was deriving")]
    WriteInComputed {
        /// The signal being written.
        signal: NodeId,
        /// The computed whose derivation performed the write.
        computed: NodeId,
    },

    /// A signal was written while its value was borrowed through `with`.
    #[error("signal {node} written while its value was borrowed")]
    ValueBorrowed {
        /// The signal being written.
        node: NodeId,
    },

    /// A derivation, effect or listener panicked.
    #[error("reactive computation panicked: {message}")]
    Panicked {
        /// The panic message, when it was a string.
        message: String,
    },

    /// Several isolated dependents failed in the same pass.
    #[error("{}", summarize(.0))]
    Multiple(Vec<ReactiveError>),
}

fn summarize(errors: &[ReactiveError]) -> String {
    match errors.first() {
        Some(first) => format!("{} dependents failed; first: {first}", errors.len()),
        None => "0 dependents failed".to_string(),
    }
}

impl ReactiveError {
    /// Fold a list of failures into a single result.
    pub(crate) fn collect(mut errors: Vec<ReactiveError>) -> Result<(), ReactiveError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ReactiveError::Multiple(errors)),
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<ReactiveError>() {
            Ok(err) => return *err,
            Err(payload) => payload,
        };
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        ReactiveError::Panicked { message }
    }
}

/// Error loading a [`RuntimeConfig`](crate::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The input was not valid configuration JSON.
    #[error("invalid runtime configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A limit was set to zero.
    #[error("`{0}` must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Unwind out of a derivation with a typed error.
///
/// The nearest [`capture`] boundary turns it back into the same variant.
pub(crate) fn raise(err: ReactiveError) -> ! {
    panic::panic_any(err)
}

/// Run user code inside an unwind boundary.
pub(crate) fn capture<R>(f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(ReactiveError::from_panic)
}
