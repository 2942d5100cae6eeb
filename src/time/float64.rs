use std::{cmp::Ordering, fmt};

use bytemuck::{Pod, Zeroable};

use crate::{
    time::{LogicalTime, LogicalTimeInterval},
    TimeError,
};

/// HLAfloat64Time: a double in `[0.0, f64::MAX]`. NaN is never a valid time.
#[derive(Copy, Clone, Debug, Default)]
#[repr(transparent)]
pub struct Float64Time(pub f64);

/// HLAfloat64Interval: epsilon is the smallest positive normal double.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
#[repr(transparent)]
pub struct Float64Interval(pub f64);

impl Float64Time {
    pub fn new(time: f64) -> Self {
        Self(time)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Float64Interval {
    pub fn new(interval: f64) -> Self {
        Self(interval)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for Float64Time {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Float64Time {}

impl PartialOrd for Float64Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Float64Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl LogicalTimeInterval for Float64Interval {
    fn zero() -> Self {
        Self(0.0)
    }

    fn epsilon() -> Self {
        Self(f64::MIN_POSITIVE)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

impl LogicalTime for Float64Time {
    type Interval = Float64Interval;

    fn initial() -> Self {
        Self(0.0)
    }

    fn final_time() -> Self {
        Self(f64::MAX)
    }

    /// A positive interval always moves the time forward, even when it is too small to change
    /// the sum; the result is then the next representable double.
    fn add(&self, interval: Float64Interval) -> Result<Self, TimeError> {
        let mut result = self.0 + interval.0;
        if interval.0 > 0.0 && result <= self.0 && self.0.is_finite() {
            result = next_up(self.0);
        }
        if result.is_nan() {
            return Err(TimeError::IllegalTimeArithmetic(format!(
                "{} + {} is NaN",
                self.0, interval.0
            )));
        }
        if result.is_infinite() {
            return Err(TimeError::IllegalTimeArithmetic(format!(
                "{} + {} is infinite",
                self.0, interval.0
            )));
        }
        if result < 0.0 {
            return Err(TimeError::IllegalTimeArithmetic(format!(
                "{} + {} is less than the initial time",
                self.0, interval.0
            )));
        }
        Ok(Self(result))
    }

    fn is_valid(&self) -> bool {
        self.0.is_finite() && self.0 >= 0.0
    }
}

fn next_up(value: f64) -> f64 {
    if value == 0.0 {
        return f64::from_bits(1);
    }
    if value > 0.0 {
        f64::from_bits(value.to_bits() + 1)
    } else {
        f64::from_bits(value.to_bits() - 1)
    }
}

impl fmt::Display for Float64Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Float64Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

unsafe impl Zeroable for Float64Time {}
unsafe impl Pod for Float64Time {}
unsafe impl Zeroable for Float64Interval {}
unsafe impl Pod for Float64Interval {}
