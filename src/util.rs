//! Miscellaneous utility structs and functions.

use std::fmt::Debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl Interval<f64> {
    /// The length of the intersection of two intervals, or zero if they are disjoint.
    pub fn intersection_length(&self, other: &Self) -> f64 {
        f64::max(f64::min(self.max, other.max) - f64::max(self.min, other.min), 0.0)
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}, {:?}]", &self.min, &self.max)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn intersection() {
        let ego = Interval::new(0.0, 5.0);
        assert_approx_eq!(ego.intersection_length(&Interval::new(3.0, 8.0)), 2.0);
        assert_approx_eq!(ego.intersection_length(&Interval::new(1.0, 2.0)), 1.0);
        assert_approx_eq!(ego.intersection_length(&Interval::new(6.0, 8.0)), 0.0);
        assert_approx_eq!(ego.intersection_length(&Interval::new(-1.0, 9.0)), 5.0);
    }
}
