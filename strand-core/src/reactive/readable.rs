//! Shared read interface of signals and computeds.

use super::computed::Computed;
use super::signal::Signal;
use crate::graph::NodeId;

/// Anything a computation can read and depend on.
///
/// Lets helpers accept either a [`Signal`] or a [`Computed`]:
///
/// ```rust
/// use strand_core::{computed, signal, Readable};
///
/// fn total(parts: &[&dyn Readable<i32>]) -> i32 {
///     parts.iter().map(|p| p.get()).sum()
/// }
///
/// let a = signal(2);
/// let b = computed({
///     let a = a.clone();
///     move || a.get() * 10
/// });
/// let parts: [&dyn Readable<i32>; 2] = [&a, &b];
/// assert_eq!(total(&parts), 22);
/// ```
pub trait Readable<T: Clone> {
    /// The node read by this handle.
    fn id(&self) -> NodeId;

    /// Read the value, registering the running computation as a dependent.
    fn get(&self) -> T;

    /// Read the value without registering a dependency.
    fn peek(&self) -> T;
}

impl<T: Clone + 'static> Readable<T> for Signal<T> {
    fn id(&self) -> NodeId {
        Signal::id(self)
    }

    fn get(&self) -> T {
        Signal::get(self)
    }

    fn peek(&self) -> T {
        Signal::peek(self)
    }
}

impl<T: Clone + 'static> Readable<T> for Computed<T> {
    fn id(&self) -> NodeId {
        Computed::id(self)
    }

    fn get(&self) -> T {
        Computed::get(self)
    }

    fn peek(&self) -> T {
        Computed::peek(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;

    fn read_all<T: Clone>(sources: &[&dyn Readable<T>]) -> Vec<T> {
        sources.iter().map(|s| s.get()).collect()
    }

    #[test]
    fn generic_reads_are_tracked() {
        let rt = Runtime::new();
        let a = rt.signal(1);
        let b = rt.computed({
            let a = a.clone();
            move || a.get() + 1
        });
        let sum = rt.computed({
            let (a, b) = (a.clone(), b.clone());
            move || {
                let parts: [&dyn Readable<i32>; 2] = [&a, &b];
                read_all(&parts).into_iter().sum::<i32>()
            }
        });

        assert_eq!(sum.get(), 3);
        a.set(5);
        assert_eq!(sum.get(), 11);
        assert_eq!(Readable::peek(&b), 6);
        assert_eq!(Readable::id(&a), a.id());
    }
}
