//! An in-process federation: N federate time managers and one coordinator exchanging requests
//! and notifications through a `mesocarp` threaded messenger. Mailbox 0 belongs to the
//! coordinator, federate `i` owns mailbox `i + 1`. Nothing moves until `pump` is called.
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use mesocarp::{
    comms::mailbox::{Message, ThreadedMessenger, ThreadedMessengerUser},
    MesoError,
};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    channel::MessageChannel,
    federate::FederateTimeManager,
    federation::{FederateHandle, FederationConfig, FederationTimeCoordinator},
    messages::{Notification, Request},
    queue::TimestampQueue,
    time::LogicalTime,
    TimeError,
};

pub const COORDINATOR_MAILBOX: usize = 0;

#[derive(Debug, Clone, Copy)]
pub enum Payload<T: LogicalTime> {
    Request(Request<T>),
    Notification(Notification<T>),
}

impl<T: LogicalTime> From<Request<T>> for Payload<T> {
    fn from(request: Request<T>) -> Self {
        Payload::Request(request)
    }
}

impl<T: LogicalTime> From<Notification<T>> for Payload<T> {
    fn from(notification: Notification<T>) -> Self {
        Payload::Notification(notification)
    }
}

/// A time-management message addressed between two mailboxes.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Envelope<T: LogicalTime> {
    pub payload: Payload<T>,
    pub to: usize,
    pub from: usize,
}

impl<T: LogicalTime> Message for Envelope<T> {
    fn to(&self) -> Option<usize> {
        Some(self.to)
    }

    fn from(&self) -> usize {
        self.from
    }
}

unsafe impl<T: LogicalTime> Pod for Envelope<T> {}
unsafe impl<T: LogicalTime> Zeroable for Envelope<T> {}

type SharedUser<const SLOTS: usize, T> = Arc<Mutex<ThreadedMessengerUser<SLOTS, Envelope<T>>>>;

/// One direction of a mailbox link. The coordinator's channels all share mailbox 0.
pub struct MailboxChannel<const SLOTS: usize, T: LogicalTime> {
    user: SharedUser<SLOTS, T>,
    from: usize,
    to: usize,
}

impl<const SLOTS: usize, T, M> MessageChannel<M> for MailboxChannel<SLOTS, T>
where
    T: LogicalTime,
    M: Into<Payload<T>>,
{
    fn send(&self, message: M) -> Result<(), TimeError> {
        let envelope = Envelope {
            payload: message.into(),
            to: self.to,
            from: self.from,
        };
        self.user.lock().send(envelope)?;
        Ok(())
    }
}

pub type LocalFederateManager<const SLOTS: usize, T, M> =
    FederateTimeManager<T, MailboxChannel<SLOTS, T>, TimestampQueue<T, M>>;

struct LocalFederate<const SLOTS: usize, T: LogicalTime, M> {
    manager: LocalFederateManager<SLOTS, T, M>,
    user: SharedUser<SLOTS, T>,
}

pub struct LocalFederation<const SLOTS: usize, T: LogicalTime, M> {
    messenger: ThreadedMessenger<SLOTS, Envelope<T>>,
    coordinator: FederationTimeCoordinator<T, MailboxChannel<SLOTS, T>>,
    coordinator_user: SharedUser<SLOTS, T>,
    federates: Vec<Option<LocalFederate<SLOTS, T, M>>>,
    notifications: Vec<Vec<Notification<T>>>,
}

impl<const SLOTS: usize, T: LogicalTime, M> LocalFederation<SLOTS, T, M> {
    /// Build a federation and join `federates` federates to it.
    pub fn create(config: FederationConfig, federates: usize) -> Result<Self, TimeError> {
        config.validate()?;
        if federates > config.max_federates {
            return Err(TimeError::FederationFull(config.max_federates));
        }
        let federation_name = config.federation_name.clone();
        let mailbox_ids: Vec<usize> = (0..=federates).collect();
        let messenger = ThreadedMessenger::new(mailbox_ids)?;
        let coordinator_user = Arc::new(Mutex::new(messenger.get_user(COORDINATOR_MAILBOX)?));
        let coordinator = FederationTimeCoordinator::new(config)?;

        let mut joined = Vec::with_capacity(federates);
        for index in 0..federates {
            let handle = FederateHandle(index);
            let mailbox = index + 1;
            let user = Arc::new(Mutex::new(messenger.get_user(mailbox)?));
            let manager = FederateTimeManager::new(
                handle,
                MailboxChannel {
                    user: Arc::clone(&user),
                    from: mailbox,
                    to: COORDINATOR_MAILBOX,
                },
                TimestampQueue::new(),
            );
            coordinator.join(
                handle,
                MailboxChannel {
                    user: Arc::clone(&coordinator_user),
                    from: COORDINATOR_MAILBOX,
                    to: mailbox,
                },
            )?;
            joined.push(Some(LocalFederate { manager, user }));
        }
        debug!(federation = %federation_name, federates, "local federation created");

        Ok(Self {
            messenger,
            coordinator,
            coordinator_user,
            federates: joined,
            notifications: vec![Vec::new(); federates],
        })
    }

    pub fn coordinator(&self) -> &FederationTimeCoordinator<T, MailboxChannel<SLOTS, T>> {
        &self.coordinator
    }

    pub fn federate(&self, index: usize) -> Result<&LocalFederateManager<SLOTS, T, M>, TimeError> {
        self.federates
            .get(index)
            .and_then(|slot| slot.as_ref())
            .map(|federate| &federate.manager)
            .ok_or(TimeError::FederateNotJoined(FederateHandle(index)))
    }

    pub fn federate_count(&self) -> usize {
        self.federates.len()
    }

    /// Every notification delivered to federate `index`, in delivery order.
    pub fn notifications(&self, index: usize) -> &[Notification<T>] {
        self.notifications
            .get(index)
            .map(|log| log.as_slice())
            .unwrap_or(&[])
    }

    /// Hand a time-stamped message from one federate to another. The sender's causal guard runs
    /// first; the receiver's queue reports its new earliest timestamp on the next `pump`.
    pub fn send_timestamped(
        &self,
        from: usize,
        to: usize,
        time: T,
        payload: M,
    ) -> Result<(), TimeError> {
        self.federate(from)?.send_interaction(time)?;
        self.federate(to)?
            .update_queue(|queue| queue.push_timestamped(time, payload))?;
        trace!(from, to, %time, "time-stamped message queued");
        Ok(())
    }

    pub fn send_receive_order(&self, to: usize, payload: M) -> Result<(), TimeError> {
        self.federate(to)?
            .update_queue(|queue| queue.push_receive_order(payload))
    }

    pub fn resign(&mut self, index: usize) -> Result<(), TimeError> {
        let federate = self
            .federates
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(TimeError::FederateNotJoined(FederateHandle(index)))?;
        federate.manager.resign();
        self.coordinator.resign(federate.manager.handle())
    }

    fn route(&mut self) -> Result<(), TimeError> {
        match self.messenger.poll() {
            Ok(mail) => {
                self.messenger.deliver(mail)?;
                Ok(())
            }
            Err(MesoError::NoDirectCommsToShare) => Ok(()),
            Err(err) => Err(TimeError::MesoError(err)),
        }
    }

    /// Move messages until every mailbox is empty. Returns how many were handled.
    pub fn pump(&mut self) -> Result<usize, TimeError> {
        let mut handled = 0;
        loop {
            self.route()?;
            let mut round = 0;

            let requests = self.coordinator_user.lock().poll();
            for envelope in requests.into_iter().flatten() {
                round += 1;
                let Payload::Request(request) = envelope.payload else {
                    warn!(from = envelope.from, "coordinator received a notification");
                    continue;
                };
                let Some(index) = envelope.from.checked_sub(1) else {
                    continue;
                };
                if let Err(err) = self.coordinator.handle_request(FederateHandle(index), request) {
                    warn!(federate = index, ?request, %err, "request rejected by coordinator");
                }
            }

            for (index, slot) in self.federates.iter().enumerate() {
                let Some(federate) = slot else {
                    continue;
                };
                let mail = federate.user.lock().poll();
                for envelope in mail.into_iter().flatten() {
                    round += 1;
                    let Payload::Notification(notification) = envelope.payload else {
                        warn!(federate = index, "federate received a request");
                        continue;
                    };
                    self.notifications[index].push(notification);
                    if let Err(err) = federate.manager.handle_notification(notification) {
                        warn!(federate = index, ?notification, %err, "notification failed");
                    }
                }
            }

            if round == 0 {
                break;
            }
            handled += round;
        }
        trace!(handled, "pump drained");
        Ok(handled)
    }
}
