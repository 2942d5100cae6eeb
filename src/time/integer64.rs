use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::{
    time::{LogicalTime, LogicalTimeInterval},
    TimeError,
};

/// HLAinteger64Time: a tick count in `[0, i64::MAX]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Integer64Time(pub i64);

/// HLAinteger64Interval: epsilon is a single tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Integer64Interval(pub i64);

impl Integer64Time {
    pub fn new(time: i64) -> Self {
        Self(time)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl Integer64Interval {
    pub fn new(interval: i64) -> Self {
        Self(interval)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl LogicalTimeInterval for Integer64Interval {
    fn zero() -> Self {
        Self(0)
    }

    fn epsilon() -> Self {
        Self(1)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl LogicalTime for Integer64Time {
    type Interval = Integer64Interval;

    fn initial() -> Self {
        Self(0)
    }

    fn final_time() -> Self {
        Self(i64::MAX)
    }

    fn add(&self, interval: Integer64Interval) -> Result<Self, TimeError> {
        let result = self.0.checked_add(interval.0).ok_or_else(|| {
            TimeError::IllegalTimeArithmetic(format!("{} + {} overflows", self.0, interval.0))
        })?;
        if result < 0 {
            return Err(TimeError::IllegalTimeArithmetic(format!(
                "{} + {} is less than the initial time",
                self.0, interval.0
            )));
        }
        Ok(Self(result))
    }

    fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for Integer64Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Integer64Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

unsafe impl Zeroable for Integer64Time {}
unsafe impl Pod for Integer64Time {}
unsafe impl Zeroable for Integer64Interval {}
unsafe impl Pod for Integer64Interval {}
