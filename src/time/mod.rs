//! `aika_rti::time` defines the logical time domain the time managers are generic over.
//! A federation picks one representation (`Integer64Time` or `Float64Time`) and every
//! federate and the coordinator share it.

use std::fmt::{Debug, Display};

use bytemuck::Pod;

use crate::TimeError;

pub mod float64;
pub mod integer64;

pub use float64::{Float64Interval, Float64Time};
pub use integer64::{Integer64Interval, Integer64Time};

/// A non-negative distance between two logical times.
pub trait LogicalTimeInterval:
    Copy + PartialEq + PartialOrd + Debug + Display + Pod + Send + Sync + 'static
{
    fn zero() -> Self;

    /// The smallest positive interval the representation can express.
    fn epsilon() -> Self;

    fn is_zero(&self) -> bool;

    /// Lookaheads must be non-negative and representable.
    fn is_valid(&self) -> bool {
        matches!(
            self.partial_cmp(&Self::zero()),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        )
    }
}

/// A totally ordered point on the federation's time axis.
pub trait LogicalTime: Copy + Ord + Debug + Display + Pod + Send + Sync + 'static {
    type Interval: LogicalTimeInterval;

    /// Domain minimum.
    fn initial() -> Self;

    /// Domain maximum, also used to stand in for "no bound".
    fn final_time() -> Self;

    /// `self + interval`, failing with `IllegalTimeArithmetic` when the result is not
    /// representable.
    fn add(&self, interval: Self::Interval) -> Result<Self, TimeError>;

    fn is_valid(&self) -> bool {
        true
    }

    fn is_initial(&self) -> bool {
        *self == Self::initial()
    }

    fn is_final(&self) -> bool {
        *self == Self::final_time()
    }
}

/// `time + (lookahead.is_zero() ? epsilon : lookahead)`. The result is strictly later than
/// `time`; a domain whose epsilon vanishes in the sum fails with `IllegalTimeArithmetic`.
pub fn add_lookahead_or_epsilon<T: LogicalTime>(
    time: T,
    lookahead: T::Interval,
) -> Result<T, TimeError> {
    if !lookahead.is_zero() {
        return time.add(lookahead);
    }
    let lots = time.add(T::Interval::epsilon())?;
    if lots <= time {
        return Err(TimeError::IllegalTimeArithmetic(format!(
            "{time} + epsilon is not later than {time}"
        )));
    }
    Ok(lots)
}

pub(crate) fn min_defined<T: LogicalTime>(lhs: Option<T>, rhs: Option<T>) -> Option<T> {
    match (lhs, rhs) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) | (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

#[cfg(test)]
mod time_tests {
    use super::*;

    #[test]
    fn test_lookahead_or_epsilon() {
        let t = Integer64Time::new(5);
        assert_eq!(
            add_lookahead_or_epsilon(t, Integer64Interval::new(0)).unwrap(),
            Integer64Time::new(6)
        );
        assert_eq!(
            add_lookahead_or_epsilon(t, Integer64Interval::new(3)).unwrap(),
            Integer64Time::new(8)
        );
        let f = Float64Time::new(5.0);
        assert!(add_lookahead_or_epsilon(f, Float64Interval::new(0.0)).unwrap() > f);
    }

    #[test]
    fn test_min_defined() {
        let a = Some(Integer64Time::new(3));
        let b = Some(Integer64Time::new(7));
        assert_eq!(min_defined(a, b), a);
        assert_eq!(min_defined(None, b), b);
        assert_eq!(min_defined::<Integer64Time>(None, None), None);
    }

    #[test]
    fn test_interval_validity() {
        assert!(Integer64Interval::new(0).is_valid());
        assert!(!Integer64Interval::new(-1).is_valid());
        assert!(!Float64Interval::new(f64::NAN).is_valid());
    }
}
