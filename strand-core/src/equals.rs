//! Equality functions for signals and computeds.
//!
//! A write is skipped when the equality function reports the new value equal
//! to the current one. The default is [`value_eq`]; the others cover the
//! cases where that is not what you want.
//!
//! ```rust
//! use strand_core::{equals, Runtime};
//!
//! let rt = Runtime::new();
//! let ratio = rt.signal_with_equals(f64::NAN, equals::same_value_f64);
//! assert!(ratio.get().is_nan());
//! ```

/// The default for [`Runtime::signal`](crate::Runtime::signal) and
/// [`Runtime::computed`](crate::Runtime::computed): `PartialEq`, except that
/// two values which are not equal to themselves (such as `NaN`) count as
/// equal. `0.0` and `-0.0` are equal.
pub fn value_eq<T: PartialEq>(a: &T, b: &T) -> bool {
    #[allow(clippy::eq_op)]
    let unordered = a != a && b != b;
    a == b || unordered
}

/// Plain `PartialEq` comparison: every `NaN` write notifies.
pub fn partial_eq<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Same-value comparison of `f64`: `NaN` equals `NaN`, `0.0` and `-0.0`
/// differ.
pub fn same_value_f64(a: &f64, b: &f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

/// Same-value comparison of `f32`. See [`same_value_f64`].
pub fn same_value_f32(a: &f32, b: &f32) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

/// Never equal: every write notifies.
pub fn never<T>(_: &T, _: &T) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_value_semantics() {
        assert!(same_value_f64(&f64::NAN, &f64::NAN));
        assert!(!same_value_f64(&0.0, &-0.0));
        assert!(same_value_f64(&1.5, &1.5));
        assert!(!same_value_f64(&1.5, &2.5));

        assert!(same_value_f32(&f32::NAN, &-f32::NAN));
        assert!(!same_value_f32(&0.0, &-0.0));
    }

    #[test]
    fn value_eq_treats_nan_as_equal() {
        assert!(value_eq(&f64::NAN, &f64::NAN));
        assert!(value_eq(&0.0, &-0.0));
        assert!(!value_eq(&f64::NAN, &1.0));
        assert!(!value_eq(&1.0, &2.0));
        assert!(value_eq(&"a", &"a"));
    }

    #[test]
    fn partial_eq_matches_operator() {
        assert!(partial_eq(&"a", &"a"));
        assert!(!partial_eq(&f64::NAN, &f64::NAN));
        assert!(partial_eq(&0.0, &-0.0));
    }

    #[test]
    fn never_is_never_equal() {
        assert!(!never(&1, &1));
        assert!(!never(&(), &()));
    }

    #[test]
    fn never_makes_every_write_notify() {
        use std::cell::Cell;
        use std::rc::Rc;

        let rt = crate::Runtime::new();
        let tick = rt.signal_with_equals((), never);
        let calls = Rc::new(Cell::new(0));
        let _handle = tick.subscribe({
            let calls = calls.clone();
            move |_| calls.set(calls.get() + 1)
        });

        tick.set(());
        tick.set(());
        assert_eq!(calls.get(), 2);
    }
}
