//! The federate-local message queue the time manager consults for LITS and instructs to
//! release messages. `TimestampQueue` is the in-memory implementation used by `LocalFederation`.
use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, VecDeque},
};

use crate::time::LogicalTime;

pub trait MessageQueue<T: LogicalTime> {
    /// Timestamp of the earliest time-stamped message not yet released.
    fn earliest_pending_timestamp(&self) -> Option<T>;

    /// Make every time-stamped message with timestamp `<= time` deliverable.
    fn release_up_to(&mut self, time: T);

    /// Make held receive-order callbacks deliverable.
    fn release_held(&mut self);

    /// Make everything deliverable regardless of timestamp.
    fn release_all(&mut self);

    fn clear(&mut self);
}

struct Queued<T: LogicalTime, M> {
    time: T,
    seq: u64,
    payload: M,
}

impl<T: LogicalTime, M> PartialEq for Queued<T, M> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl<T: LogicalTime, M> Eq for Queued<T, M> {}

impl<T: LogicalTime, M> PartialOrd for Queued<T, M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: LogicalTime, M> Ord for Queued<T, M> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// A delivered message with its timestamp, `None` for receive-order.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery<T: LogicalTime, M> {
    pub time: Option<T>,
    pub payload: M,
}

/// Time-stamp ordered messages wait in `pending`, receive-order callbacks wait in `held`,
/// and whatever has been released sits in `deliverable` until the application drains it.
pub struct TimestampQueue<T: LogicalTime, M> {
    pending: BinaryHeap<Reverse<Queued<T, M>>>,
    held: Vec<M>,
    deliverable: VecDeque<Delivery<T, M>>,
    next_seq: u64,
}

impl<T: LogicalTime, M> TimestampQueue<T, M> {
    pub fn new() -> Self {
        Self {
            pending: BinaryHeap::new(),
            held: Vec::new(),
            deliverable: VecDeque::new(),
            next_seq: 0,
        }
    }

    pub fn push_timestamped(&mut self, time: T, payload: M) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Reverse(Queued { time, seq, payload }));
    }

    pub fn push_receive_order(&mut self, payload: M) {
        self.held.push(payload);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    pub fn pop_deliverable(&mut self) -> Option<Delivery<T, M>> {
        self.deliverable.pop_front()
    }

    pub fn drain_deliverable(&mut self) -> Vec<Delivery<T, M>> {
        self.deliverable.drain(..).collect()
    }
}

impl<T: LogicalTime, M> Default for TimestampQueue<T, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: LogicalTime, M> MessageQueue<T> for TimestampQueue<T, M> {
    fn earliest_pending_timestamp(&self) -> Option<T> {
        self.pending.peek().map(|queued| queued.0.time)
    }

    fn release_up_to(&mut self, time: T) {
        while let Some(Reverse(queued)) = self.pending.peek() {
            if queued.time > time {
                break;
            }
            if let Some(Reverse(queued)) = self.pending.pop() {
                self.deliverable.push_back(Delivery {
                    time: Some(queued.time),
                    payload: queued.payload,
                });
            }
        }
    }

    fn release_held(&mut self) {
        for payload in self.held.drain(..) {
            self.deliverable.push_back(Delivery {
                time: None,
                payload,
            });
        }
    }

    fn release_all(&mut self) {
        self.release_held();
        while let Some(Reverse(queued)) = self.pending.pop() {
            self.deliverable.push_back(Delivery {
                time: Some(queued.time),
                payload: queued.payload,
            });
        }
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.held.clear();
        self.deliverable.clear();
    }
}
