//! Batching
//!
//! A batch defers effect notifications until its outermost level exits.
//! Writes inside a batch still commit immediately and computeds read inside
//! it see the new values; only effects wait.

use super::runtime::{Runtime, RuntimeInner};
use crate::error::ReactiveError;

/// One open batch level. Dropping it closes the level without flushing.
pub(crate) struct BatchGuard<'a> {
    rt: &'a RuntimeInner,
}

impl<'a> BatchGuard<'a> {
    pub(crate) fn new(rt: &'a RuntimeInner) -> Self {
        rt.open_batch();
        Self { rt }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.rt.close_batch();
    }
}

/// Coalesce the notifications of every write made inside `f`.
///
/// Uses the calling thread's default runtime.
///
/// # Panics
///
/// Panics with the error message if an effect fails when the batch flushes.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().batch(f)
}

/// Coalesce the notifications of every write made inside `f`, reporting
/// effect failures.
pub fn try_batch<R>(f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
    Runtime::current().try_batch(f)
}

/// Run `f` without registering any reads as dependencies.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().untrack(f)
}
