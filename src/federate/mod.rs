//! `aika_rti::federate` is the federate-side half of time management: a state machine that
//! validates the federate's own time-management calls, forwards them to the coordinator, and
//! reacts to the coordinator's notifications by moving its logical time and releasing messages.
use parking_lot::RwLock;
use tracing::{debug, error, trace, warn};

use crate::{
    channel::MessageChannel,
    federation::FederateHandle,
    messages::{AdvanceKind, Notification, PendingRequest, Request},
    queue::MessageQueue,
    time::{min_defined, LogicalTime},
    TimeError,
};

pub mod record;
pub mod snapshot;

pub use record::{ConstrainedState, FederateTimeRecord, RegulatingState, TemporalState};

struct FederateState<T: LogicalTime, Q> {
    record: FederateTimeRecord<T>,
    queue: Q,
}

/// Per-federate time manager. All state sits behind one `RwLock`; queries take the read lock,
/// every transition takes the write lock for its whole check-then-commit sequence.
pub struct FederateTimeManager<T: LogicalTime, C, Q> {
    handle: FederateHandle,
    channel: C,
    state: RwLock<FederateState<T, Q>>,
}

impl<T, C, Q> FederateTimeManager<T, C, Q>
where
    T: LogicalTime,
    C: MessageChannel<Request<T>>,
    Q: MessageQueue<T>,
{
    pub fn new(handle: FederateHandle, channel: C, queue: Q) -> Self {
        Self {
            handle,
            channel,
            state: RwLock::new(FederateState {
                record: FederateTimeRecord::new(),
                queue,
            }),
        }
    }

    pub fn handle(&self) -> FederateHandle {
        self.handle
    }

    /// Copy of the current record.
    pub fn record(&self) -> FederateTimeRecord<T> {
        self.state.read().record.clone()
    }

    pub fn is_time_regulating(&self) -> bool {
        self.state.read().record.is_time_regulating()
    }

    pub fn is_time_constrained(&self) -> bool {
        self.state.read().record.is_time_constrained()
    }

    pub fn is_time_advancing(&self) -> bool {
        self.state.read().record.is_time_advancing()
    }

    pub fn enable_time_regulation(&self, lookahead: T::Interval) -> Result<(), TimeError> {
        let mut state = self.state.write();
        let record = &mut state.record;
        record.check_if_time_regulation_enabled()?;
        FederateTimeRecord::<T>::check_lookahead(lookahead)?;
        record.check_if_in_time_advancing_state()?;
        record.check_if_time_regulation_pending()?;

        self.channel.send(Request::EnableTimeRegulation(lookahead))?;
        record.lookahead = Some(lookahead);
        record.regulating_state = RegulatingState::BecomingRegulating;
        debug!(federate = %self.handle, %lookahead, "requested time regulation");
        Ok(())
    }

    pub fn disable_time_regulation(&self) -> Result<(), TimeError> {
        let mut state = self.state.write();
        let record = &mut state.record;
        record.check_if_time_regulation_not_enabled()?;

        self.channel.send(Request::DisableTimeRegulation)?;
        record.regulating_state = RegulatingState::NotRegulating;
        record.lookahead = None;
        record.lots = None;
        debug!(federate = %self.handle, "disabled time regulation");
        Ok(())
    }

    pub fn enable_time_constrained(&self) -> Result<(), TimeError> {
        let mut state = self.state.write();
        let record = &mut state.record;
        record.check_if_time_constrained_enabled()?;
        record.check_if_in_time_advancing_state()?;
        record.check_if_time_constrained_pending()?;

        self.channel.send(Request::EnableTimeConstrained)?;
        record.constrained_state = ConstrainedState::BecomingConstrained;
        debug!(federate = %self.handle, "requested time constrained");
        Ok(())
    }

    pub fn disable_time_constrained(&self) -> Result<(), TimeError> {
        let mut state = self.state.write();
        let record = &mut state.record;
        record.check_if_time_constrained_not_enabled()?;

        self.channel.send(Request::DisableTimeConstrained)?;
        record.constrained_state = ConstrainedState::NotConstrained;
        debug!(federate = %self.handle, "disabled time constrained");
        Ok(())
    }

    /// Change the lookahead of a regulating federate. LOTS picks up the new value on the next
    /// advance request.
    pub fn modify_lookahead(&self, lookahead: T::Interval) -> Result<(), TimeError> {
        let mut state = self.state.write();
        let record = &mut state.record;
        record.check_if_time_regulation_not_enabled()?;
        FederateTimeRecord::<T>::check_lookahead(lookahead)?;
        record.check_if_in_time_advancing_state()?;

        self.channel.send(Request::ModifyLookahead(lookahead))?;
        record.lookahead = Some(lookahead);
        debug!(federate = %self.handle, %lookahead, "modified lookahead");
        Ok(())
    }

    pub fn time_advance_request(&self, time: T) -> Result<(), TimeError> {
        self.request_advance(time, AdvanceKind::TimeAdvanceRequest)
    }

    pub fn time_advance_request_available(&self, time: T) -> Result<(), TimeError> {
        self.request_advance(time, AdvanceKind::TimeAdvanceRequestAvailable)
    }

    pub fn next_message_request(&self, time: T) -> Result<(), TimeError> {
        self.request_advance(time, AdvanceKind::NextMessageRequest)
    }

    pub fn next_message_request_available(&self, time: T) -> Result<(), TimeError> {
        self.request_advance(time, AdvanceKind::NextMessageRequestAvailable)
    }

    pub fn flush_queue_request(&self, time: T) -> Result<(), TimeError> {
        self.request_advance(time, AdvanceKind::FlushQueueRequest)
    }

    pub fn request_advance(&self, time: T, kind: AdvanceKind) -> Result<(), TimeError> {
        let mut state = self.state.write();
        let FederateState { record, queue } = &mut *state;
        FederateTimeRecord::<T>::check_time(time)?;
        record.check_if_time_already_passed(time)?;
        record.check_if_in_time_advancing_state()?;
        record.check_if_time_regulation_pending()?;
        record.check_if_time_constrained_pending()?;

        let lots = match (record.is_time_regulating(), record.lookahead) {
            (true, Some(lookahead)) => {
                let lots = kind
                    .lots(time, lookahead)
                    .map_err(TimeError::into_invalid_time)?;
                Some(record.lots.map_or(lots, |previous| previous.max(lots)))
            }
            _ => record.lots,
        };

        if kind.is_next_message() {
            let earliest = queue.earliest_pending_timestamp();
            if earliest != record.reported_lits {
                self.channel.send(Request::UpdateLits(earliest))?;
                record.reported_lits = earliest;
            }
        }
        let pending = PendingRequest::new(time, kind);
        self.channel.send(Request::Advance(pending))?;

        record.lots = lots;
        record.pending = Some(pending);
        record.temporal_state = TemporalState::TimeAdvancing;
        queue.release_held();
        if kind == AdvanceKind::FlushQueueRequest {
            queue.release_all();
        }
        debug!(federate = %self.handle, %time, ?kind, "requested time advance");
        Ok(())
    }

    pub fn handle_notification(&self, notification: Notification<T>) -> Result<(), TimeError> {
        match notification {
            Notification::TimeRegulationEnabled(time) => self.time_regulation_enabled(time),
            Notification::TimeConstrainedEnabled(time) => self.time_constrained_enabled(time),
            Notification::TimeAdvanceGrant(time) => self.time_advance_grant(time),
            Notification::GaltAdvanced(galt) => {
                self.galt_advanced(galt);
                Ok(())
            }
            Notification::GaltUndefined => {
                self.galt_undefined();
                Ok(())
            }
        }
    }

    pub fn time_regulation_enabled(&self, time: T) -> Result<(), TimeError> {
        let mut state = self.state.write();
        let record = &mut state.record;
        if record.regulating_state != RegulatingState::BecomingRegulating {
            warn!(federate = %self.handle, %time, "unexpected time regulation enabled");
        }
        let lookahead = record
            .lookahead
            .ok_or(TimeError::TimeRegulationIsNotEnabled)?;
        let time = record.federate_time.max(time);
        let lots = match time.add(lookahead) {
            Ok(lots) => lots,
            Err(err) => {
                error!(
                    federate = %self.handle,
                    %time,
                    %lookahead,
                    %err,
                    "LOTS overflow, time regulation not enabled"
                );
                return Err(err.into_invalid_time());
            }
        };

        record.federate_time = time;
        record.lots = Some(lots);
        record.regulating_state = RegulatingState::Regulating;
        debug!(federate = %self.handle, %time, %lots, "time regulation enabled");
        Ok(())
    }

    pub fn time_constrained_enabled(&self, time: T) -> Result<(), TimeError> {
        let mut state = self.state.write();
        let record = &mut state.record;
        if record.constrained_state != ConstrainedState::BecomingConstrained {
            warn!(federate = %self.handle, %time, "unexpected time constrained enabled");
        }
        record.federate_time = record.federate_time.max(time);
        record.constrained_state = ConstrainedState::Constrained;
        debug!(federate = %self.handle, time = %record.federate_time, "time constrained enabled");
        Ok(())
    }

    pub fn time_advance_grant(&self, time: T) -> Result<(), TimeError> {
        let mut state = self.state.write();
        let FederateState { record, queue } = &mut *state;
        let Some(pending) = record.pending else {
            warn!(federate = %self.handle, %time, "grant without a pending request");
            return Ok(());
        };
        if time < record.federate_time {
            warn!(
                federate = %self.handle,
                %time,
                current = %record.federate_time,
                "grant earlier than current time ignored"
            );
            return Ok(());
        }
        // a next-message request answered early by a queued message lowers LOTS the same way
        // the coordinator did, never below the GALT it published alongside the grant
        if pending.kind.is_next_message()
            && time < pending.time
            && record.is_time_regulating()
            && record.is_time_constrained()
        {
            if let Some(lookahead) = record.lookahead {
                let lots = pending.kind.lots(time, lookahead)?;
                record.lots = Some(record.galt.map_or(lots, |galt| lots.max(galt)));
            }
        }

        record.federate_time = time;
        record.pending = None;
        record.temporal_state = TemporalState::TimeGranted;
        record.delivery_bound = Some(time);
        queue.release_up_to(time);

        if record.is_time_constrained() {
            let earliest = queue.earliest_pending_timestamp();
            if earliest != record.reported_lits {
                self.channel.send(Request::UpdateLits(earliest))?;
                record.reported_lits = earliest;
            }
        }
        debug!(federate = %self.handle, %time, "time advance granted");
        Ok(())
    }

    /// Cache the new GALT and, while advancing, release whatever it makes safe. The grant and any
    /// LOTS adjustment arrive separately from the coordinator.
    pub fn galt_advanced(&self, galt: T) {
        let mut state = self.state.write();
        let FederateState { record, queue } = &mut *state;
        if let Some(current) = record.galt {
            if galt < current {
                warn!(federate = %self.handle, %galt, %current, "ignoring GALT regression");
                return;
            }
        }
        record.galt = Some(galt);
        trace!(federate = %self.handle, %galt, "GALT advanced");

        let Some(pending) = record.pending else {
            return;
        };
        if !record.is_time_constrained() {
            return;
        }
        let bound = pending
            .resolve(queue.earliest_pending_timestamp(), Some(galt))
            .deliver_bound();
        record.delivery_bound = Some(bound);
        queue.release_up_to(bound);
    }

    pub fn galt_undefined(&self) {
        let mut state = self.state.write();
        state.record.galt = None;
        state.record.delivery_bound = None;
        trace!(federate = %self.handle, "GALT undefined");
    }

    pub fn query_galt(&self) -> Option<T> {
        self.state.read().record.galt
    }

    pub fn query_logical_time(&self) -> T {
        self.state.read().record.federate_time
    }

    pub fn query_lookahead(&self) -> Result<T::Interval, TimeError> {
        let state = self.state.read();
        state.record.check_if_time_regulation_not_enabled()?;
        state
            .record
            .lookahead
            .ok_or(TimeError::TimeRegulationIsNotEnabled)
    }

    /// The smaller of GALT and the earliest pending message, whichever are defined.
    pub fn query_lits(&self) -> Option<T> {
        let state = self.state.read();
        min_defined(state.record.galt, state.queue.earliest_pending_timestamp())
    }

    pub fn check_if_invalid_timestamp(&self, time: T) -> Result<(), TimeError> {
        self.state.read().record.check_if_invalid_timestamp(time)
    }

    pub fn update_attribute_values(&self, time: T) -> Result<(), TimeError> {
        self.check_if_invalid_timestamp(time)
    }

    pub fn send_interaction(&self, time: T) -> Result<(), TimeError> {
        self.check_if_invalid_timestamp(time)
    }

    pub fn delete_object_instance(&self, time: T) -> Result<(), TimeError> {
        self.check_if_invalid_timestamp(time)
    }

    /// Run `f` against the queue, then report a changed earliest timestamp to the coordinator.
    pub fn update_queue<R>(&self, f: impl FnOnce(&mut Q) -> R) -> Result<R, TimeError> {
        let mut state = self.state.write();
        let FederateState { record, queue } = &mut *state;
        let result = f(queue);
        self.report_lits(record, queue)?;
        Ok(result)
    }

    /// Report the queue's earliest timestamp if it changed since the last report.
    pub fn message_enqueued(&self) -> Result<(), TimeError> {
        let mut state = self.state.write();
        let FederateState { record, queue } = &mut *state;
        self.report_lits(record, queue)
    }

    fn report_lits(&self, record: &mut FederateTimeRecord<T>, queue: &Q) -> Result<(), TimeError> {
        let earliest = queue.earliest_pending_timestamp();
        if earliest == record.reported_lits {
            return Ok(());
        }
        self.channel.send(Request::UpdateLits(earliest))?;
        record.reported_lits = earliest;
        trace!(federate = %self.handle, lits = ?earliest, "reported LITS");
        Ok(())
    }

    /// Drop everything still queued. Called when the federate resigns.
    pub fn resign(&self) {
        self.state.write().queue.clear();
        debug!(federate = %self.handle, "resigned");
    }

    pub fn save_state(&self) -> Vec<u8> {
        self.state.read().record.to_bytes()
    }

    /// Move forward to a saved time. The snapshot must be idle and taken under the same modes
    /// and lookahead; LOTS never drops below what was already promised. The coordinator hears of
    /// the move before the local record changes.
    pub fn restore_state(&self, bytes: &[u8]) -> Result<(), TimeError> {
        let saved = FederateTimeRecord::<T>::from_bytes(bytes)?;
        let mut state = self.state.write();
        let record = &mut state.record;
        record.check_if_in_time_advancing_state()?;
        record.check_if_time_regulation_pending()?;
        record.check_if_time_constrained_pending()?;
        if saved.is_time_advancing() {
            return Err(TimeError::InvalidSnapshot(
                "snapshot was taken while advancing".to_string(),
            ));
        }
        if saved.regulating_state != record.regulating_state
            || saved.constrained_state != record.constrained_state
            || saved.lookahead != record.lookahead
        {
            return Err(TimeError::InvalidSnapshot(
                "snapshot modes or lookahead differ from the federate's".to_string(),
            ));
        }
        record.check_if_time_already_passed(saved.federate_time)?;

        let time = saved.federate_time;
        let lots = record.lots.max(saved.lots);
        self.channel.send(Request::Restore { time, lots })?;
        record.federate_time = time;
        record.lots = lots;
        debug!(federate = %self.handle, %time, ?lots, "restored time state");
        Ok(())
    }
}
