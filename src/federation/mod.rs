//! `aika_rti::federation` is the federation-side half of time management. The coordinator keeps a
//! proxy record per joined federate and answers pending advance requests. GALT is tracked twice:
//! federation-wide as the minimum LOTS over all regulating federates, and per federate, where a
//! regulating federate's GALT leaves out its own LOTS.
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::{
    channel::MessageChannel,
    messages::{AdvanceKind, Notification, PendingRequest, Request, Resolution},
    time::{LogicalTime, LogicalTimeInterval},
    TimeError,
};

pub mod config;
pub mod proxy;

pub use config::FederationConfig;
pub use proxy::FederateProxy;

/// Stable identifier of a joined federate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FederateHandle(pub usize);

impl fmt::Display for FederateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "federate-{}", self.0)
    }
}

struct FederationTimeState<T: LogicalTime, C> {
    /// Federation-wide GALT, the one non-regulating federates see.
    galt: Option<T>,
    /// Highest GALT ever published to any federate. New regulators never start below it.
    galt_floor: Option<T>,
    proxies: BTreeMap<FederateHandle, FederateProxy<T, C>>,
    regulating: BTreeSet<FederateHandle>,
    constrained: BTreeSet<FederateHandle>,
}

pub struct FederationTimeCoordinator<T: LogicalTime, C> {
    config: FederationConfig,
    state: Mutex<FederationTimeState<T, C>>,
}

impl<T, C> FederationTimeCoordinator<T, C>
where
    T: LogicalTime,
    C: MessageChannel<Notification<T>>,
{
    pub fn new(config: FederationConfig) -> Result<Self, TimeError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(FederationTimeState {
                galt: None,
                galt_floor: None,
                proxies: BTreeMap::new(),
                regulating: BTreeSet::new(),
                constrained: BTreeSet::new(),
            }),
        })
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn join(&self, handle: FederateHandle, channel: C) -> Result<(), TimeError> {
        let mut state = self.state.lock();
        if state.proxies.contains_key(&handle) {
            return Err(TimeError::FederateAlreadyJoined(handle));
        }
        if state.proxies.len() >= self.config.max_federates {
            return Err(TimeError::FederationFull(self.config.max_federates));
        }
        let mut proxy = FederateProxy::new(handle, channel);
        if let Some(galt) = state.galt {
            proxy.notify_galt(galt);
        }
        state.proxies.insert(handle, proxy);
        info!(federation = %self.config.federation_name, federate = %handle, "federate joined");
        Ok(())
    }

    /// Drop the federate's proxy, abandoning anything it had in flight.
    pub fn resign(&self, handle: FederateHandle) -> Result<(), TimeError> {
        let mut state = self.state.lock();
        if state.proxies.remove(&handle).is_none() {
            return Err(TimeError::FederateNotJoined(handle));
        }
        state.regulating.remove(&handle);
        state.constrained.remove(&handle);
        info!(federation = %self.config.federation_name, federate = %handle, "federate resigned");
        state.settle();
        Ok(())
    }

    pub fn handle_request(
        &self,
        handle: FederateHandle,
        request: Request<T>,
    ) -> Result<(), TimeError> {
        trace!(federate = %handle, ?request, "handling request");
        match request {
            Request::EnableTimeRegulation(lookahead) => {
                self.enable_time_regulation(handle, lookahead)
            }
            Request::DisableTimeRegulation => self.disable_time_regulation(handle),
            Request::EnableTimeConstrained => self.enable_time_constrained(handle),
            Request::DisableTimeConstrained => self.disable_time_constrained(handle),
            Request::ModifyLookahead(lookahead) => self.modify_lookahead(handle, lookahead),
            Request::Advance(pending) => self.advance(handle, pending),
            Request::UpdateLits(lits) => self.update_lits(handle, lits),
            Request::Restore { time, lots } => self.restore(handle, time, lots),
        }
    }

    /// Regulation starts at the later of the federate's time and the highest GALT any federate
    /// has been told, so the new LOTS cannot pull a published GALT backwards.
    pub fn enable_time_regulation(
        &self,
        handle: FederateHandle,
        lookahead: T::Interval,
    ) -> Result<(), TimeError> {
        if !lookahead.is_valid() {
            return Err(TimeError::InvalidLookahead(format!("{lookahead}")));
        }
        let mut state = self.state.lock();
        if state.regulating.contains(&handle) {
            return Err(TimeError::TimeRegulationAlreadyEnabled);
        }
        let base = state.galt_floor.unwrap_or_else(T::initial);
        let proxy = state.proxy_mut(handle)?;
        let time = proxy.federate_time.max(base);
        let lots = match time.add(lookahead) {
            Ok(lots) => lots,
            Err(err) => {
                error!(
                    federate = %handle,
                    %time,
                    %lookahead,
                    %err,
                    "abandoning time regulation enable"
                );
                return Ok(());
            }
        };
        proxy.federate_time = time;
        proxy.lookahead = Some(lookahead);
        proxy.lots = Some(lots);
        proxy.notify(Notification::TimeRegulationEnabled(time));
        state.regulating.insert(handle);
        debug!(federate = %handle, %time, %lots, "time regulation enabled");
        state.settle();
        Ok(())
    }

    pub fn disable_time_regulation(&self, handle: FederateHandle) -> Result<(), TimeError> {
        let mut state = self.state.lock();
        state.proxy_mut(handle)?;
        if !state.regulating.remove(&handle) {
            return Err(TimeError::TimeRegulationIsNotEnabled);
        }
        let proxy = state.proxy_mut(handle)?;
        proxy.lookahead = None;
        proxy.lots = None;
        debug!(federate = %handle, "time regulation disabled");
        state.settle();
        Ok(())
    }

    /// A regulating federate becomes constrained at its own time, which keeps it behind its LOTS.
    /// Any other federate moves up to its GALT. Either way the enable waits while the federate is
    /// ahead of its GALT.
    pub fn enable_time_constrained(&self, handle: FederateHandle) -> Result<(), TimeError> {
        let mut state = self.state.lock();
        if state.constrained.contains(&handle) {
            return Err(TimeError::TimeConstrainedAlreadyEnabled);
        }
        let regulating = state.regulating.contains(&handle);
        let proxy = state.proxy_mut(handle)?;
        match proxy.galt {
            Some(galt) if proxy.federate_time > galt => {
                proxy.constrained_pending = true;
                debug!(
                    federate = %handle,
                    time = %proxy.federate_time,
                    %galt,
                    "time constrained waiting for GALT"
                );
                return Ok(());
            }
            Some(galt) if !regulating => proxy.federate_time = galt,
            _ => {}
        }
        let time = proxy.federate_time;
        proxy.notify(Notification::TimeConstrainedEnabled(time));
        state.constrained.insert(handle);
        debug!(federate = %handle, %time, "time constrained enabled");
        state.settle();
        Ok(())
    }

    pub fn disable_time_constrained(&self, handle: FederateHandle) -> Result<(), TimeError> {
        let mut state = self.state.lock();
        let proxy = state.proxy_mut(handle)?;
        let was_pending = std::mem::take(&mut proxy.constrained_pending);
        if !state.constrained.remove(&handle) && !was_pending {
            return Err(TimeError::TimeConstrainedIsNotEnabled);
        }
        debug!(federate = %handle, "time constrained disabled");
        state.settle();
        Ok(())
    }

    pub fn modify_lookahead(
        &self,
        handle: FederateHandle,
        lookahead: T::Interval,
    ) -> Result<(), TimeError> {
        if !lookahead.is_valid() {
            return Err(TimeError::InvalidLookahead(format!("{lookahead}")));
        }
        let mut state = self.state.lock();
        if !state.regulating.contains(&handle) {
            return Err(TimeError::TimeRegulationIsNotEnabled);
        }
        state.proxy_mut(handle)?.lookahead = Some(lookahead);
        debug!(federate = %handle, %lookahead, "lookahead modified");
        Ok(())
    }

    /// Record an advance request, recompute GALT if the federate regulates, and grant whatever
    /// has become grantable.
    pub fn advance(
        &self,
        handle: FederateHandle,
        pending: PendingRequest<T>,
    ) -> Result<(), TimeError> {
        let mut state = self.state.lock();
        let regulating = state.regulating.contains(&handle);
        let constrained = state.constrained.contains(&handle);
        let proxy = state.proxy_mut(handle)?;
        if proxy.pending.is_some() {
            return Err(TimeError::InTimeAdvancingState);
        }

        if regulating {
            let lookahead = proxy
                .lookahead
                .ok_or(TimeError::TimeRegulationIsNotEnabled)?;
            match pending.kind.lots(pending.time, lookahead) {
                Ok(lots) => {
                    let lots = proxy.lots.map_or(lots, |previous| previous.max(lots));
                    proxy.lots = Some(lots);
                    debug!(federate = %handle, %lots, "LOTS updated");
                }
                Err(err) => {
                    error!(
                        federate = %handle,
                        time = %pending.time,
                        %err,
                        "abandoning advance request"
                    );
                    return Ok(());
                }
            }
        }

        let mut pending = pending;
        if pending.kind == AdvanceKind::TimeAdvanceRequestAvailable && constrained {
            if let Some(galt) = proxy.galt {
                pending.time = proxy.federate_time.max(pending.time.min(galt));
            }
        }
        proxy.pending = Some(pending);
        trace!(federate = %handle, time = %pending.time, kind = ?pending.kind, "advance pending");
        state.settle();
        Ok(())
    }

    pub fn update_lits(&self, handle: FederateHandle, lits: Option<T>) -> Result<(), TimeError> {
        let mut state = self.state.lock();
        state.proxy_mut(handle)?.lits = lits;
        trace!(federate = %handle, ?lits, "LITS updated");
        state.settle();
        Ok(())
    }

    /// Move an idle federate forward to a restored time. Its LOTS never shrinks.
    pub fn restore(
        &self,
        handle: FederateHandle,
        time: T,
        lots: Option<T>,
    ) -> Result<(), TimeError> {
        let mut state = self.state.lock();
        let regulating = state.regulating.contains(&handle);
        let proxy = state.proxy_mut(handle)?;
        if proxy.pending.is_some() {
            return Err(TimeError::InTimeAdvancingState);
        }
        if time < proxy.federate_time {
            return Err(TimeError::LogicalTimeAlreadyPassed {
                requested: format!("{time}"),
                current: format!("{}", proxy.federate_time),
            });
        }
        proxy.federate_time = time;
        if let (true, Some(lots)) = (regulating, lots) {
            proxy.lots = Some(proxy.lots.map_or(lots, |current| current.max(lots)));
        }
        debug!(federate = %handle, %time, lots = ?proxy.lots, "federate restored");
        state.settle();
        Ok(())
    }

    /// Federation-wide GALT.
    pub fn galt(&self) -> Option<T> {
        self.state.lock().galt
    }

    /// GALT as published to one federate.
    pub fn galt_for(&self, handle: FederateHandle) -> Option<T> {
        self.state.lock().proxies.get(&handle).and_then(|p| p.galt)
    }

    pub fn joined(&self) -> Vec<FederateHandle> {
        self.state.lock().proxies.keys().copied().collect()
    }

    pub fn regulating_federates(&self) -> Vec<FederateHandle> {
        self.state.lock().regulating.iter().copied().collect()
    }

    pub fn constrained_federates(&self) -> Vec<FederateHandle> {
        self.state.lock().constrained.iter().copied().collect()
    }

    pub fn federate_time(&self, handle: FederateHandle) -> Option<T> {
        self.state.lock().proxies.get(&handle).map(|p| p.federate_time)
    }

    pub fn lots(&self, handle: FederateHandle) -> Option<T> {
        self.state.lock().proxies.get(&handle).and_then(|p| p.lots)
    }
}

impl<T, C> FederationTimeState<T, C>
where
    T: LogicalTime,
    C: MessageChannel<Notification<T>>,
{
    fn proxy_mut(&mut self, handle: FederateHandle) -> Result<&mut FederateProxy<T, C>, TimeError> {
        self.proxies
            .get_mut(&handle)
            .ok_or(TimeError::FederateNotJoined(handle))
    }

    /// Least LOTS over the regulating federates, leaving out `excluding`.
    fn min_regulating_lots(&self, excluding: Option<FederateHandle>) -> Option<T> {
        self.regulating
            .iter()
            .filter(|handle| Some(**handle) != excluding)
            .filter_map(|handle| self.proxies.get(handle).and_then(|p| p.lots))
            .min()
    }

    /// GALT a federate should see right now, before holding it at what it was already told.
    fn galt_view(&self, handle: FederateHandle) -> Option<T> {
        if self.regulating.contains(&handle) {
            self.min_regulating_lots(Some(handle))
        } else {
            self.galt
        }
    }

    fn settle(&mut self) {
        self.lower_next_message_requests();
        self.recompute_galt();
        self.grant_ready();
    }

    /// A regulating, constrained federate waiting on a next-message request with a queued message
    /// its GALT already admits will advance only to that message, so its LOTS drops to match.
    fn lower_next_message_requests(&mut self) {
        let candidates: Vec<FederateHandle> = self
            .regulating
            .intersection(&self.constrained)
            .copied()
            .collect();
        for handle in candidates {
            let Some(others) = self.min_regulating_lots(Some(handle)) else {
                continue;
            };
            let Some(proxy) = self.proxies.get_mut(&handle) else {
                continue;
            };
            let (Some(mut pending), Some(lits), Some(lookahead)) =
                (proxy.pending, proxy.lits, proxy.lookahead)
            else {
                continue;
            };
            if !pending.kind.is_next_message()
                || lits >= pending.time
                || !pending.kind.admits(&lits, &others)
            {
                continue;
            }
            match pending.kind.lots(lits, lookahead) {
                Ok(lots) => {
                    let lots = proxy.galt.map_or(lots, |galt| lots.max(galt));
                    pending.time = lits;
                    proxy.pending = Some(pending);
                    proxy.lots = Some(lots);
                    debug!(
                        federate = %handle,
                        time = %lits,
                        %lots,
                        "next message request lowered to LITS"
                    );
                }
                Err(err) => {
                    warn!(federate = %handle, %err, "could not lower LOTS to LITS");
                }
            }
        }
    }

    fn recompute_galt(&mut self) {
        match (self.galt, self.min_regulating_lots(None)) {
            (current, None) => {
                self.galt = None;
                if current.is_some() {
                    debug!("GALT undefined");
                }
            }
            (Some(current), Some(candidate)) if candidate <= current => {
                if candidate < current {
                    warn!(%current, %candidate, "holding GALT at its published value");
                }
            }
            (_, Some(candidate)) => {
                self.galt = Some(candidate);
                debug!(galt = %candidate, "GALT advanced");
            }
        }

        let views: Vec<(FederateHandle, Option<T>)> = self
            .proxies
            .keys()
            .map(|handle| (*handle, self.galt_view(*handle)))
            .collect();
        let mut floor = self.galt_floor.max(self.galt);
        for (handle, view) in views {
            let Some(proxy) = self.proxies.get_mut(&handle) else {
                continue;
            };
            match view {
                None if proxy.galt.is_some() => proxy.notify_galt_undefined(),
                None => {}
                Some(view) => {
                    if !proxy.notify_galt(view) && proxy.galt.is_some_and(|held| view < held) {
                        trace!(federate = %handle, %view, "holding federate GALT");
                    }
                    floor = floor.max(proxy.galt);
                }
            }
        }
        self.galt_floor = floor;
    }

    fn grant_ready(&mut self) {
        for (handle, proxy) in self.proxies.iter_mut() {
            let galt = proxy.galt;
            if proxy.constrained_pending {
                if galt.map_or(true, |galt| proxy.federate_time <= galt) {
                    proxy.constrained_pending = false;
                    self.constrained.insert(*handle);
                    proxy.notify(Notification::TimeConstrainedEnabled(proxy.federate_time));
                    debug!(
                        federate = %handle,
                        time = %proxy.federate_time,
                        "time constrained enabled"
                    );
                }
                continue;
            }
            let Some(pending) = proxy.pending else {
                continue;
            };
            let resolution = if self.constrained.contains(handle)
                || pending.kind == AdvanceKind::FlushQueueRequest
            {
                pending.resolve(proxy.lits, galt)
            } else {
                Resolution::Grant(pending.time)
            };
            if let Some(time) = resolution.grant() {
                proxy.grant(time);
                debug!(federate = %handle, time = %proxy.federate_time, "time advance granted");
            }
        }
    }
}

#[cfg(test)]
mod federation_tests {
    use super::*;
    use std::sync::atomic::{self, AtomicUsize};

    use crate::{
        channel::RecordingChannel,
        federate::FederateTimeManager,
        queue::TimestampQueue,
        time::{Float64Interval, Float64Time, Integer64Interval, Integer64Time},
    };

    type Outbox = RecordingChannel<Notification<Integer64Time>>;
    type FloatOutbox = RecordingChannel<Notification<Float64Time>>;

    fn t(v: i64) -> Integer64Time {
        Integer64Time::new(v)
    }

    fn la(v: i64) -> Integer64Interval {
        Integer64Interval::new(v)
    }

    fn coordinator(
        federates: usize,
    ) -> (FederationTimeCoordinator<Integer64Time, Outbox>, Vec<Outbox>) {
        let coordinator =
            FederationTimeCoordinator::new(FederationConfig::new("test").with_max_federates(8))
                .unwrap();
        let mut outboxes = Vec::new();
        for i in 0..federates {
            let outbox = Outbox::new();
            coordinator.join(FederateHandle(i), outbox.clone()).unwrap();
            outboxes.push(outbox);
        }
        (coordinator, outboxes)
    }

    #[test]
    fn test_join_and_resign_errors() {
        let (coordinator, _) = coordinator(1);
        assert!(matches!(
            coordinator.join(FederateHandle(0), Outbox::new()),
            Err(TimeError::FederateAlreadyJoined(_))
        ));
        assert!(matches!(
            coordinator.resign(FederateHandle(5)),
            Err(TimeError::FederateNotJoined(_))
        ));
        assert!(matches!(
            coordinator.update_lits(FederateHandle(5), None),
            Err(TimeError::FederateNotJoined(_))
        ));
    }

    #[test]
    fn test_federation_full() {
        let coordinator = FederationTimeCoordinator::<Integer64Time, Outbox>::new(
            FederationConfig::new("small").with_max_federates(1),
        )
        .unwrap();
        coordinator.join(FederateHandle(0), Outbox::new()).unwrap();
        assert!(matches!(
            coordinator.join(FederateHandle(1), Outbox::new()),
            Err(TimeError::FederationFull(1))
        ));
    }

    #[test]
    fn test_regulating_federate_galt_excludes_own_lots() {
        let (coordinator, outboxes) = coordinator(2);
        assert_eq!(coordinator.galt(), None);
        coordinator.enable_time_regulation(FederateHandle(0), la(1)).unwrap();
        assert_eq!(coordinator.galt(), Some(t(1)));
        // the only regulator has no GALT of its own
        assert_eq!(coordinator.galt_for(FederateHandle(0)), None);
        assert_eq!(coordinator.galt_for(FederateHandle(1)), Some(t(1)));

        coordinator.enable_time_regulation(FederateHandle(1), la(3)).unwrap();
        // the second regulator starts at the published GALT, so its LOTS is 1 + 3
        assert_eq!(coordinator.federate_time(FederateHandle(1)), Some(t(1)));
        assert_eq!(coordinator.galt(), Some(t(1)));
        assert_eq!(coordinator.galt_for(FederateHandle(0)), Some(t(4)));
        assert_eq!(coordinator.galt_for(FederateHandle(1)), Some(t(1)));
        assert_eq!(
            outboxes[0].take(),
            vec![
                Notification::TimeRegulationEnabled(t(0)),
                Notification::GaltAdvanced(t(4)),
            ]
        );

        coordinator
            .advance(
                FederateHandle(0),
                PendingRequest::new(t(10), AdvanceKind::TimeAdvanceRequest),
            )
            .unwrap();
        // federate 0 is not constrained: granted at once
        assert_eq!(outboxes[0].take(), vec![Notification::TimeAdvanceGrant(t(10))]);
        assert_eq!(coordinator.galt(), Some(t(4)));
        assert_eq!(coordinator.lots(FederateHandle(0)), Some(t(11)));
        assert_eq!(coordinator.galt_for(FederateHandle(1)), Some(t(11)));
    }

    #[test]
    fn test_zero_lookahead_regulators_advance_on_float_time() {
        let coordinator = FederationTimeCoordinator::<Float64Time, FloatOutbox>::new(
            FederationConfig::new("float"),
        )
        .unwrap();
        let outboxes = [FloatOutbox::new(), FloatOutbox::new()];
        let (a, b) = (FederateHandle(0), FederateHandle(1));
        for (handle, outbox) in [a, b].into_iter().zip(outboxes.iter()) {
            coordinator.join(handle, outbox.clone()).unwrap();
            coordinator
                .enable_time_regulation(handle, Float64Interval::new(0.0))
                .unwrap();
            coordinator.enable_time_constrained(handle).unwrap();
        }
        let tar = |time: f64| {
            PendingRequest::new(Float64Time::new(time), AdvanceKind::TimeAdvanceRequest)
        };

        coordinator.advance(a, tar(5.0)).unwrap();
        assert!(coordinator.lots(a).is_some_and(|lots| lots > Float64Time::new(5.0)));
        assert!(!outboxes[0]
            .take()
            .contains(&Notification::TimeAdvanceGrant(Float64Time::new(5.0))));

        coordinator.advance(b, tar(5.0)).unwrap();
        for outbox in &outboxes {
            assert!(outbox
                .take()
                .contains(&Notification::TimeAdvanceGrant(Float64Time::new(5.0))));
        }
        assert_eq!(coordinator.federate_time(a), Some(Float64Time::new(5.0)));
        assert_eq!(coordinator.federate_time(b), Some(Float64Time::new(5.0)));
    }

    #[test]
    fn test_lone_regulating_constrained_federate_is_not_blocked_by_itself() {
        let coordinator = FederationTimeCoordinator::<Float64Time, FloatOutbox>::new(
            FederationConfig::new("alone"),
        )
        .unwrap();
        let outbox = FloatOutbox::new();
        let handle = FederateHandle(0);
        coordinator.join(handle, outbox.clone()).unwrap();
        coordinator
            .enable_time_regulation(handle, Float64Interval::new(0.0))
            .unwrap();
        coordinator.enable_time_constrained(handle).unwrap();
        coordinator
            .advance(
                handle,
                PendingRequest::new(Float64Time::new(5.0), AdvanceKind::TimeAdvanceRequest),
            )
            .unwrap();
        assert_eq!(
            outbox.take().last(),
            Some(&Notification::TimeAdvanceGrant(Float64Time::new(5.0)))
        );
    }

    #[test]
    fn test_constrained_waits_for_galt() {
        let (coordinator, outboxes) = coordinator(2);
        let regulator = FederateHandle(0);
        let follower = FederateHandle(1);
        coordinator.enable_time_regulation(regulator, la(2)).unwrap();
        coordinator.enable_time_constrained(follower).unwrap();
        assert_eq!(coordinator.federate_time(follower), Some(t(2)));
        outboxes[1].take();

        coordinator
            .advance(follower, PendingRequest::new(t(5), AdvanceKind::TimeAdvanceRequest))
            .unwrap();
        assert!(outboxes[1].is_empty());

        coordinator
            .advance(regulator, PendingRequest::new(t(3), AdvanceKind::TimeAdvanceRequest))
            .unwrap();
        assert_eq!(coordinator.galt(), Some(t(5)));
        // TAR needs time < GALT
        assert_eq!(outboxes[1].take(), vec![Notification::GaltAdvanced(t(5))]);

        outboxes[0].take();
        coordinator
            .advance(regulator, PendingRequest::new(t(4), AdvanceKind::TimeAdvanceRequest))
            .unwrap();
        assert_eq!(coordinator.galt(), Some(t(6)));
        assert_eq!(
            outboxes[1].take(),
            vec![Notification::GaltAdvanced(t(6)), Notification::TimeAdvanceGrant(t(5))]
        );
    }

    #[test]
    fn test_time_advance_request_available_is_clamped() {
        let (coordinator, outboxes) = coordinator(2);
        coordinator.enable_time_regulation(FederateHandle(0), la(4)).unwrap();
        coordinator.enable_time_constrained(FederateHandle(1)).unwrap();
        outboxes[1].take();
        coordinator
            .advance(
                FederateHandle(1),
                PendingRequest::new(t(9), AdvanceKind::TimeAdvanceRequestAvailable),
            )
            .unwrap();
        assert_eq!(outboxes[1].take(), vec![Notification::TimeAdvanceGrant(t(4))]);
    }

    #[test]
    fn test_next_message_lowered_to_lits() {
        let (coordinator, outboxes) = coordinator(2);
        let a = FederateHandle(0);
        let b = FederateHandle(1);
        coordinator.enable_time_regulation(a, la(1)).unwrap();
        coordinator.enable_time_constrained(a).unwrap();
        coordinator.enable_time_regulation(b, la(1)).unwrap();
        assert_eq!(coordinator.galt(), Some(t(1)));

        coordinator.update_lits(a, Some(t(3))).unwrap();
        coordinator
            .advance(a, PendingRequest::new(t(10), AdvanceKind::NextMessageRequest))
            .unwrap();
        outboxes[0].take();
        coordinator
            .advance(b, PendingRequest::new(t(20), AdvanceKind::TimeAdvanceRequest))
            .unwrap();
        // a's LOTS is lowered to 3 + 1 before GALT is published
        assert_eq!(coordinator.lots(a), Some(t(4)));
        assert_eq!(coordinator.galt(), Some(t(4)));
        assert_eq!(
            outboxes[0].take(),
            vec![Notification::GaltAdvanced(t(21)), Notification::TimeAdvanceGrant(t(3))]
        );
        // b already saw 11 and keeps it
        assert_eq!(coordinator.galt_for(b), Some(t(11)));
    }

    #[test]
    fn test_galt_undefined_fan_out_and_floor() {
        let (coordinator, outboxes) = coordinator(2);
        coordinator.enable_time_regulation(FederateHandle(0), la(5)).unwrap();
        coordinator
            .advance(FederateHandle(0), PendingRequest::new(t(10), AdvanceKind::TimeAdvanceRequest))
            .unwrap();
        assert_eq!(coordinator.galt(), Some(t(15)));
        coordinator.disable_time_regulation(FederateHandle(0)).unwrap();
        assert_eq!(coordinator.galt(), None);
        assert_eq!(outboxes[1].take().last(), Some(&Notification::GaltUndefined));

        // a later regulator starts at the highest published GALT
        coordinator.enable_time_regulation(FederateHandle(1), la(1)).unwrap();
        assert_eq!(coordinator.federate_time(FederateHandle(1)), Some(t(15)));
        assert_eq!(coordinator.galt(), Some(t(16)));
    }

    #[test]
    fn test_constrained_enable_pending() {
        let (coordinator, outboxes) = coordinator(2);
        let follower = FederateHandle(1);
        coordinator
            .advance(follower, PendingRequest::new(t(8), AdvanceKind::TimeAdvanceRequest))
            .unwrap();
        assert_eq!(outboxes[1].take(), vec![Notification::TimeAdvanceGrant(t(8))]);

        coordinator.enable_time_regulation(FederateHandle(0), la(2)).unwrap();
        coordinator.enable_time_constrained(follower).unwrap();
        assert!(coordinator.constrained_federates().is_empty());

        coordinator
            .advance(FederateHandle(0), PendingRequest::new(t(6), AdvanceKind::TimeAdvanceRequest))
            .unwrap();
        assert_eq!(coordinator.constrained_federates(), vec![follower]);
        assert_eq!(
            outboxes[1].take(),
            vec![
                Notification::GaltAdvanced(t(2)),
                Notification::GaltAdvanced(t(8)),
                Notification::TimeConstrainedEnabled(t(8)),
            ]
        );
    }

    #[test]
    fn test_resign_recomputes_galt() {
        let (coordinator, outboxes) = coordinator(3);
        coordinator.enable_time_regulation(FederateHandle(0), la(1)).unwrap();
        coordinator.enable_time_regulation(FederateHandle(1), la(9)).unwrap();
        coordinator.enable_time_constrained(FederateHandle(2)).unwrap();
        assert_eq!(coordinator.galt(), Some(t(1)));
        outboxes[2].take();
        coordinator.resign(FederateHandle(0)).unwrap();
        assert_eq!(coordinator.galt(), Some(t(10)));
        assert_eq!(outboxes[2].take(), vec![Notification::GaltAdvanced(t(10))]);
        assert_eq!(coordinator.joined().len(), 2);
    }

    #[test]
    fn test_flush_queue_grants_immediately() {
        let (coordinator, outboxes) = coordinator(2);
        coordinator.enable_time_regulation(FederateHandle(0), la(3)).unwrap();
        coordinator.enable_time_constrained(FederateHandle(1)).unwrap();
        outboxes[1].take();
        coordinator.update_lits(FederateHandle(1), Some(t(2))).unwrap();
        coordinator
            .advance(FederateHandle(1), PendingRequest::new(t(10), AdvanceKind::FlushQueueRequest))
            .unwrap();
        assert_eq!(outboxes[1].take(), vec![Notification::TimeAdvanceGrant(t(3))]);
    }

    #[test]
    fn test_restore_moves_idle_federate_forward() {
        let (coordinator, outboxes) = coordinator(2);
        let (regulator, follower) = (FederateHandle(0), FederateHandle(1));
        coordinator.enable_time_regulation(regulator, la(1)).unwrap();
        outboxes[1].take();

        coordinator.restore(regulator, t(5), Some(t(6))).unwrap();
        assert_eq!(coordinator.federate_time(regulator), Some(t(5)));
        assert_eq!(coordinator.lots(regulator), Some(t(6)));
        assert_eq!(outboxes[1].take(), vec![Notification::GaltAdvanced(t(6))]);
        assert!(matches!(
            coordinator.restore(regulator, t(3), Some(t(4))),
            Err(TimeError::LogicalTimeAlreadyPassed { .. })
        ));
        // a saved LOTS below the current one never lowers it
        coordinator.restore(regulator, t(5), Some(t(2))).unwrap();
        assert_eq!(coordinator.lots(regulator), Some(t(6)));

        coordinator.enable_time_constrained(follower).unwrap();
        coordinator
            .advance(follower, PendingRequest::new(t(9), AdvanceKind::TimeAdvanceRequest))
            .unwrap();
        assert!(matches!(
            coordinator.restore(follower, t(10), None),
            Err(TimeError::InTimeAdvancingState)
        ));
    }

    type ThreadedManager = FederateTimeManager<
        Integer64Time,
        RecordingChannel<Request<Integer64Time>>,
        TimestampQueue<Integer64Time, ()>,
    >;

    #[test]
    fn test_concurrent_federates_see_monotonic_galt() {
        const FEDERATES: usize = 4;
        const TARGET: i64 = 40;

        let (coordinator, outboxes) = coordinator(FEDERATES);
        let requests: Vec<RecordingChannel<Request<Integer64Time>>> =
            (0..FEDERATES).map(|_| RecordingChannel::new()).collect();
        let managers: Vec<ThreadedManager> = requests
            .iter()
            .enumerate()
            .map(|(index, channel)| {
                FederateTimeManager::new(
                    FederateHandle(index),
                    channel.clone(),
                    TimestampQueue::new(),
                )
            })
            .collect();

        // forward one federate's requests and deliver its notifications
        let exchange = |index: usize, galts: &mut Vec<Integer64Time>| -> usize {
            let mut moved = 0;
            for request in requests[index].take() {
                coordinator
                    .handle_request(FederateHandle(index), request)
                    .unwrap();
                moved += 1;
            }
            for notification in outboxes[index].take() {
                if let Notification::GaltAdvanced(galt) = notification {
                    galts.push(galt);
                }
                managers[index].handle_notification(notification).unwrap();
                moved += 1;
            }
            moved
        };

        let mut galts: Vec<Vec<Integer64Time>> = vec![Vec::new(); FEDERATES];
        let settle = |galts: &mut Vec<Vec<Integer64Time>>| loop {
            let moved: usize = (0..FEDERATES)
                .map(|index| exchange(index, &mut galts[index]))
                .sum();
            if moved == 0 {
                break;
            }
        };
        for manager in &managers {
            manager.enable_time_constrained().unwrap();
        }
        settle(&mut galts);
        for manager in &managers {
            manager.enable_time_regulation(la(1)).unwrap();
        }
        settle(&mut galts);
        assert!(managers
            .iter()
            .all(|m| m.is_time_regulating() && m.is_time_constrained()));

        let finished = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for (index, log) in galts.iter_mut().enumerate() {
                let (exchange, managers, finished) = (&exchange, &managers, &finished);
                scope.spawn(move || {
                    let manager = &managers[index];
                    let mut idle = 0u64;
                    while manager.query_logical_time() < t(TARGET) || manager.is_time_advancing() {
                        if !manager.is_time_advancing() {
                            let next = t(manager.query_logical_time().value() + 1);
                            manager.time_advance_request(next).unwrap();
                        }
                        if exchange(index, log) == 0 {
                            idle += 1;
                            assert!(idle < 50_000_000, "federate {index} stalled");
                            std::thread::yield_now();
                        }
                    }
                    finished.fetch_add(1, atomic::Ordering::SeqCst);
                });
            }

            let (managers, finished) = (&managers, &finished);
            scope.spawn(move || {
                let mut last = vec![t(0); FEDERATES];
                let mut last_galt: Vec<Option<Integer64Time>> = vec![None; FEDERATES];
                while finished.load(atomic::Ordering::SeqCst) < FEDERATES {
                    for (index, manager) in managers.iter().enumerate() {
                        let now = manager.query_logical_time();
                        assert!(now >= last[index]);
                        last[index] = now;
                        let galt = manager.query_galt();
                        assert!(galt >= last_galt[index]);
                        last_galt[index] = galt;
                        let record = manager.record();
                        assert!(record.lots.is_some_and(|lots| lots >= record.federate_time));
                        let _ = manager.query_lits();
                    }
                    std::thread::yield_now();
                }
            });
        });

        for (index, log) in galts.iter().enumerate() {
            assert!(log.windows(2).all(|pair| pair[0] <= pair[1]), "{log:?}");
            assert_eq!(managers[index].query_logical_time(), t(TARGET));
            assert_eq!(coordinator.federate_time(FederateHandle(index)), Some(t(TARGET)));
        }
    }
}
