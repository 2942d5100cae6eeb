use crate::{
    messages::PendingRequest,
    time::{LogicalTime, LogicalTimeInterval},
    TimeError,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TemporalState {
    TimeGranted,
    TimeAdvancing,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegulatingState {
    NotRegulating,
    BecomingRegulating,
    Regulating,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConstrainedState {
    NotConstrained,
    BecomingConstrained,
    Constrained,
}

/// Everything a federate knows about its own position in time.
///
/// `lookahead` and `lots` are `Some` exactly while regulating (or becoming regulating for
/// `lookahead`); `pending` is `Some` exactly while `temporal_state` is `TimeAdvancing`.
#[derive(Clone, Debug, PartialEq)]
pub struct FederateTimeRecord<T: LogicalTime> {
    pub temporal_state: TemporalState,
    pub regulating_state: RegulatingState,
    pub constrained_state: ConstrainedState,
    pub federate_time: T,
    pub lookahead: Option<T::Interval>,
    pub lots: Option<T>,
    pub pending: Option<PendingRequest<T>>,
    /// Latest GALT the coordinator published, `None` while undefined.
    pub galt: Option<T>,
    /// Last earliest-pending timestamp sent to the coordinator.
    pub reported_lits: Option<T>,
    /// Upper bound of what the queue has been told to release.
    pub delivery_bound: Option<T>,
}

impl<T: LogicalTime> FederateTimeRecord<T> {
    pub fn new() -> Self {
        Self {
            temporal_state: TemporalState::TimeGranted,
            regulating_state: RegulatingState::NotRegulating,
            constrained_state: ConstrainedState::NotConstrained,
            federate_time: T::initial(),
            lookahead: None,
            lots: None,
            pending: None,
            galt: None,
            reported_lits: None,
            delivery_bound: None,
        }
    }

    pub fn is_time_advancing(&self) -> bool {
        self.temporal_state == TemporalState::TimeAdvancing
    }

    pub fn is_time_regulating(&self) -> bool {
        self.regulating_state == RegulatingState::Regulating
    }

    pub fn is_time_constrained(&self) -> bool {
        self.constrained_state == ConstrainedState::Constrained
    }

    pub fn check_if_in_time_advancing_state(&self) -> Result<(), TimeError> {
        if self.is_time_advancing() {
            return Err(TimeError::InTimeAdvancingState);
        }
        Ok(())
    }

    pub fn check_if_time_regulation_pending(&self) -> Result<(), TimeError> {
        if self.regulating_state == RegulatingState::BecomingRegulating {
            return Err(TimeError::RequestForTimeRegulationPending);
        }
        Ok(())
    }

    pub fn check_if_time_constrained_pending(&self) -> Result<(), TimeError> {
        if self.constrained_state == ConstrainedState::BecomingConstrained {
            return Err(TimeError::RequestForTimeConstrainedPending);
        }
        Ok(())
    }

    pub fn check_if_time_regulation_enabled(&self) -> Result<(), TimeError> {
        if self.is_time_regulating() {
            return Err(TimeError::TimeRegulationAlreadyEnabled);
        }
        Ok(())
    }

    pub fn check_if_time_regulation_not_enabled(&self) -> Result<(), TimeError> {
        if !self.is_time_regulating() {
            return Err(TimeError::TimeRegulationIsNotEnabled);
        }
        Ok(())
    }

    pub fn check_if_time_constrained_enabled(&self) -> Result<(), TimeError> {
        if self.is_time_constrained() {
            return Err(TimeError::TimeConstrainedAlreadyEnabled);
        }
        Ok(())
    }

    pub fn check_if_time_constrained_not_enabled(&self) -> Result<(), TimeError> {
        if !self.is_time_constrained() {
            return Err(TimeError::TimeConstrainedIsNotEnabled);
        }
        Ok(())
    }

    pub fn check_lookahead(lookahead: T::Interval) -> Result<(), TimeError> {
        if !lookahead.is_valid() {
            return Err(TimeError::InvalidLookahead(format!("{lookahead}")));
        }
        Ok(())
    }

    pub fn check_time(time: T) -> Result<(), TimeError> {
        if !time.is_valid() {
            return Err(TimeError::InvalidLogicalTime(format!("{time}")));
        }
        Ok(())
    }

    pub fn check_if_time_already_passed(&self, time: T) -> Result<(), TimeError> {
        if time < self.federate_time {
            return Err(TimeError::LogicalTimeAlreadyPassed {
                requested: format!("{time}"),
                current: format!("{}", self.federate_time),
            });
        }
        Ok(())
    }

    /// Outgoing time-stamped messages must respect LOTS while regulating, otherwise they must lie
    /// strictly after the time the federate is at or advancing to.
    pub fn check_if_invalid_timestamp(&self, time: T) -> Result<(), TimeError> {
        Self::check_time(time)?;
        if self.is_time_regulating() {
            if let Some(lots) = self.lots {
                if time < lots {
                    return Err(TimeError::InvalidLogicalTime(format!(
                        "{time} is less than LOTS {lots}"
                    )));
                }
            }
            return Ok(());
        }
        let floor = match self.pending {
            Some(pending) if self.is_time_advancing() => pending.time,
            _ => self.federate_time,
        };
        if time <= floor {
            return Err(TimeError::InvalidLogicalTime(format!(
                "{time} is not greater than {floor}"
            )));
        }
        Ok(())
    }

    /// Reject a record whose fields contradict each other: invalid times or lookahead, optional
    /// fields that disagree with the mode they belong to, or a LOTS behind the federate.
    pub fn validate(&self) -> Result<(), TimeError> {
        let times = [
            Some(self.federate_time),
            self.lots,
            self.pending.map(|pending| pending.time),
            self.galt,
            self.reported_lits,
            self.delivery_bound,
        ];
        if let Some(time) = times.into_iter().flatten().find(|time| !time.is_valid()) {
            return Err(inconsistent(format!("invalid logical time {time}")));
        }
        if let Some(lookahead) = self.lookahead.filter(|lookahead| !lookahead.is_valid()) {
            return Err(inconsistent(format!("invalid lookahead {lookahead}")));
        }
        if self.pending.is_some() != self.is_time_advancing() {
            return Err(inconsistent("pending request does not match temporal state".into()));
        }
        if self.lots.is_some() != self.is_time_regulating() {
            return Err(inconsistent("LOTS does not match regulating state".into()));
        }
        let expects_lookahead = self.regulating_state != RegulatingState::NotRegulating;
        if self.lookahead.is_some() != expects_lookahead {
            return Err(inconsistent("lookahead does not match regulating state".into()));
        }
        let mut floor = self.federate_time;
        if let Some(pending) = self.pending {
            if pending.time < self.federate_time {
                return Err(inconsistent(format!(
                    "pending request at {} is behind federate time {}",
                    pending.time, self.federate_time
                )));
            }
            floor = pending.time;
        }
        if let Some(lots) = self.lots.filter(|lots| *lots < floor) {
            return Err(inconsistent(format!("LOTS {lots} is behind {floor}")));
        }
        Ok(())
    }
}

fn inconsistent(reason: String) -> TimeError {
    TimeError::InvalidSnapshot(reason)
}

impl<T: LogicalTime> Default for FederateTimeRecord<T> {
    fn default() -> Self {
        Self::new()
    }
}
