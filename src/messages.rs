//! The message vocabulary exchanged between a federate and the federation's time coordinator,
//! plus the per-kind advance policy both sides use to decide grants and delivery bounds.
use crate::{
    time::{add_lookahead_or_epsilon, min_defined, LogicalTime},
    TimeError,
};

/// The five flavours of time-advance request. They differ only in whether GALT comparisons are
/// strict and whether a zero lookahead is widened to epsilon when computing LOTS.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AdvanceKind {
    TimeAdvanceRequest,
    TimeAdvanceRequestAvailable,
    NextMessageRequest,
    NextMessageRequestAvailable,
    FlushQueueRequest,
}

impl AdvanceKind {
    /// Strict kinds need `time < galt`, the others accept `time <= galt`.
    pub fn is_strict(&self) -> bool {
        matches!(
            self,
            AdvanceKind::TimeAdvanceRequest | AdvanceKind::NextMessageRequest
        )
    }

    pub fn uses_epsilon(&self) -> bool {
        self.is_strict()
    }

    pub fn is_next_message(&self) -> bool {
        matches!(
            self,
            AdvanceKind::NextMessageRequest | AdvanceKind::NextMessageRequestAvailable
        )
    }

    pub fn is_available(&self) -> bool {
        matches!(
            self,
            AdvanceKind::TimeAdvanceRequestAvailable | AdvanceKind::NextMessageRequestAvailable
        )
    }

    /// Whether `time` is safe to reach with GALT at `galt`.
    pub fn admits<T: Ord>(&self, time: &T, galt: &T) -> bool {
        if self.is_strict() {
            time < galt
        } else {
            time <= galt
        }
    }

    /// LOTS for a request at `time` under `lookahead`.
    pub fn lots<T: LogicalTime>(&self, time: T, lookahead: T::Interval) -> Result<T, TimeError> {
        if self.uses_epsilon() {
            add_lookahead_or_epsilon(time, lookahead)
        } else {
            time.add(lookahead)
        }
    }
}

/// An outstanding time-advance request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest<T: LogicalTime> {
    pub time: T,
    pub kind: AdvanceKind,
}

impl<T: LogicalTime> PendingRequest<T> {
    pub fn new(time: T, kind: AdvanceKind) -> Self {
        Self { time, kind }
    }

    /// Decide what the request can do given the earliest pending message and the current GALT.
    /// An undefined GALT means no regulating federate can constrain the advance.
    pub fn resolve(&self, lits: Option<T>, galt: Option<T>) -> Resolution<T> {
        let galt = match galt {
            Some(galt) => galt,
            None => {
                return match self.kind {
                    AdvanceKind::FlushQueueRequest => {
                        Resolution::Grant(min_defined(Some(self.time), lits).unwrap_or(self.time))
                    }
                    _ => Resolution::Grant(self.time),
                }
            }
        };
        match self.kind {
            AdvanceKind::NextMessageRequest | AdvanceKind::NextMessageRequestAvailable => {
                match lits.filter(|m| self.kind.admits(m, &galt)) {
                    Some(m) => Resolution::Grant(self.time.min(m)),
                    None if self.kind.admits(&self.time, &galt) => Resolution::Grant(self.time),
                    None => Resolution::Hold { deliver_up_to: galt },
                }
            }
            AdvanceKind::FlushQueueRequest => {
                let bound = self.time.min(galt);
                Resolution::Grant(min_defined(Some(bound), lits).unwrap_or(bound))
            }
            AdvanceKind::TimeAdvanceRequest | AdvanceKind::TimeAdvanceRequestAvailable => {
                if self.kind.admits(&self.time, &galt) {
                    Resolution::Grant(self.time)
                } else {
                    Resolution::Hold {
                        deliver_up_to: self.time.min(galt),
                    }
                }
            }
        }
    }
}

/// Outcome of evaluating a pending request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resolution<T: LogicalTime> {
    Grant(T),
    Hold { deliver_up_to: T },
}

impl<T: LogicalTime> Resolution<T> {
    /// Messages up to this timestamp may be handed to the application.
    pub fn deliver_bound(&self) -> T {
        match self {
            Resolution::Grant(time) => *time,
            Resolution::Hold { deliver_up_to } => *deliver_up_to,
        }
    }

    pub fn grant(&self) -> Option<T> {
        match self {
            Resolution::Grant(time) => Some(*time),
            Resolution::Hold { .. } => None,
        }
    }
}

/// Federate to coordinator.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Request<T: LogicalTime> {
    EnableTimeRegulation(T::Interval),
    DisableTimeRegulation,
    EnableTimeConstrained,
    DisableTimeConstrained,
    ModifyLookahead(T::Interval),
    /// Any of the five advance requests, tagged by kind.
    Advance(PendingRequest<T>),
    /// Earliest pending message timestamp, `None` once the queue has drained.
    UpdateLits(Option<T>),
    /// The federate moved forward to a saved time, with the LOTS it now promises.
    Restore { time: T, lots: Option<T> },
}

impl<T: LogicalTime> Request<T> {
    pub fn time_advance_request(time: T) -> Self {
        Request::Advance(PendingRequest::new(time, AdvanceKind::TimeAdvanceRequest))
    }

    pub fn next_message_request(time: T) -> Self {
        Request::Advance(PendingRequest::new(time, AdvanceKind::NextMessageRequest))
    }
}

/// Coordinator to federate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Notification<T: LogicalTime> {
    TimeRegulationEnabled(T),
    TimeConstrainedEnabled(T),
    TimeAdvanceGrant(T),
    GaltAdvanced(T),
    GaltUndefined,
}
