use std::sync::Arc;

use parking_lot::Mutex;

use crate::TimeError;

/// One-way transport to a peer. Implementations must not call back into the sender
/// synchronously: senders hold their state lock while sending.
pub trait MessageChannel<M> {
    fn send(&self, message: M) -> Result<(), TimeError>;
}

/// An outbox that keeps everything sent through it until taken.
pub struct RecordingChannel<M> {
    sent: Arc<Mutex<Vec<M>>>,
}

impl<M> RecordingChannel<M> {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Drain everything sent so far.
    pub fn take(&self) -> Vec<M> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl<M> Clone for RecordingChannel<M> {
    fn clone(&self) -> Self {
        Self {
            sent: Arc::clone(&self.sent),
        }
    }
}

impl<M> Default for RecordingChannel<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MessageChannel<M> for RecordingChannel<M> {
    fn send(&self, message: M) -> Result<(), TimeError> {
        self.sent.lock().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod channel_tests {
    use super::*;

    #[test]
    fn test_recording_channel_shares_outbox() {
        let channel = RecordingChannel::new();
        let clone = channel.clone();
        channel.send(1u8).unwrap();
        clone.send(2u8).unwrap();
        assert_eq!(channel.len(), 2);
        assert_eq!(clone.take(), vec![1, 2]);
        assert!(channel.is_empty());
    }
}
