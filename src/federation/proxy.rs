use tracing::error;

use crate::{
    channel::MessageChannel,
    federation::FederateHandle,
    messages::{Notification, PendingRequest},
    time::LogicalTime,
};

/// The coordinator's view of one joined federate.
pub struct FederateProxy<T: LogicalTime, C> {
    pub handle: FederateHandle,
    pub federate_time: T,
    pub lookahead: Option<T::Interval>,
    pub lots: Option<T>,
    pub pending: Option<PendingRequest<T>>,
    /// Earliest pending message timestamp last reported by the federate.
    pub lits: Option<T>,
    /// Constrained enable waiting for GALT to reach `federate_time`.
    pub constrained_pending: bool,
    /// GALT as this federate sees it: the least LOTS of the other regulating federates while it
    /// regulates, the federation-wide GALT otherwise. Only ever moves forward while defined.
    pub galt: Option<T>,
    channel: C,
}

impl<T, C> FederateProxy<T, C>
where
    T: LogicalTime,
    C: MessageChannel<Notification<T>>,
{
    pub fn new(handle: FederateHandle, channel: C) -> Self {
        Self {
            handle,
            federate_time: T::initial(),
            lookahead: None,
            lots: None,
            pending: None,
            lits: None,
            constrained_pending: false,
            galt: None,
            channel,
        }
    }

    /// Deliver a notification. Transport failures are logged, not returned.
    pub fn notify(&self, notification: Notification<T>) {
        if let Err(err) = self.channel.send(notification) {
            error!(federate = %self.handle, ?notification, %err, "failed to notify federate");
        }
    }

    /// Advance this federate's GALT to `galt` and tell it, unless it already holds an equal or
    /// later value. Returns whether anything was published.
    pub fn notify_galt(&mut self, galt: T) -> bool {
        if self.galt.is_some_and(|current| current >= galt) {
            return false;
        }
        self.galt = Some(galt);
        self.notify(Notification::GaltAdvanced(galt));
        true
    }

    pub fn notify_galt_undefined(&mut self) {
        self.galt = None;
        self.notify(Notification::GaltUndefined);
    }

    /// Answer the pending request at `time`.
    pub fn grant(&mut self, time: T) {
        let time = self.federate_time.max(time);
        self.federate_time = time;
        self.pending = None;
        self.notify(Notification::TimeAdvanceGrant(time));
    }
}
