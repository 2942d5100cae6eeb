use mesocarp::MesoError;
use thiserror::Error;

use crate::federation::FederateHandle;

/// Error enum for feedback on time management failures
#[derive(Debug, Error)]
pub enum TimeError {
    // sequencing
    #[error("federate is in the time advancing state")]
    InTimeAdvancingState,
    #[error("a request to enable time regulation is pending")]
    RequestForTimeRegulationPending,
    #[error("a request to enable time constrained is pending")]
    RequestForTimeConstrainedPending,
    #[error("time regulation is already enabled")]
    TimeRegulationAlreadyEnabled,
    #[error("time regulation is not enabled")]
    TimeRegulationIsNotEnabled,
    #[error("time constrained is already enabled")]
    TimeConstrainedAlreadyEnabled,
    #[error("time constrained is not enabled")]
    TimeConstrainedIsNotEnabled,

    // values
    #[error("invalid logical time: {0}")]
    InvalidLogicalTime(String),
    #[error("invalid lookahead: {0}")]
    InvalidLookahead(String),
    #[error("logical time already passed: {requested} < {current}")]
    LogicalTimeAlreadyPassed { requested: String, current: String },

    // arithmetic
    #[error("illegal time arithmetic: {0}")]
    IllegalTimeArithmetic(String),
    #[error("invalid logical time interval: {0}")]
    InvalidLogicalTimeInterval(String),

    // infrastructure
    #[error("federate {0} is not joined")]
    FederateNotJoined(FederateHandle),
    #[error("federate {0} is already joined")]
    FederateAlreadyJoined(FederateHandle),
    #[error("federation is full ({0} federates)")]
    FederationFull(usize),
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("mailbox error: {0:?}")]
    MesoError(MesoError),
}

impl From<MesoError> for TimeError {
    fn from(err: MesoError) -> Self {
        TimeError::MesoError(err)
    }
}

impl TimeError {
    /// Collapse time-domain arithmetic failures into `InvalidLogicalTime`, leaving other errors
    /// untouched.
    pub fn into_invalid_time(self) -> Self {
        match self {
            TimeError::IllegalTimeArithmetic(msg) | TimeError::InvalidLogicalTimeInterval(msg) => {
                TimeError::InvalidLogicalTime(msg)
            }
            other => other,
        }
    }
}
