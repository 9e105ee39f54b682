use std::net::SocketAddr;

use tracing::info;

use crate::protocol::{Frame, MessageId, Outbox};

/// Best-effort acknowledgment handling.
///
/// Received acknowledgments are logged and counted; nothing is retried and
/// no protocol decision depends on them.
#[derive(Debug, Clone)]
pub struct AckTracker {
    outbox: Outbox,
    observed: u64,
}

impl AckTracker {
    pub fn new(outbox: Outbox) -> Self {
        AckTracker {
            outbox,
            observed: 0,
        }
    }

    /// Records an acknowledgment received from `from`
    pub fn on_ack(&mut self, id: &MessageId, from: SocketAddr) {
        self.observed += 1;
        info!(id = %id, from = %from.ip(), "ACK received");
    }

    /// Sends `@@ACK <id>` to `to`
    pub fn send_ack(&self, to: SocketAddr, id: &MessageId) {
        self.outbox.unicast(to, Frame::Ack(id.clone()));
    }

    /// Number of acknowledgments seen since startup
    pub fn observed(&self) -> u64 {
        self.observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Effect;

    #[test]
    fn test_send_ack() {
        let (outbox, mut rx) = Outbox::channel();
        let tracker = AckTracker::new(outbox);
        let to: SocketAddr = "10.0.0.5:8888".parse().unwrap();

        tracker.send_ack(to, &MessageId::new("42-AP"));

        match rx.try_recv().unwrap() {
            Effect::Unicast { to: addr, frame } => {
                assert_eq!(addr, to);
                assert_eq!(&frame.to_bytes()[..], b"@@ACK 42-AP");
            }
            other => panic!("Unexpected effect: {:?}", other),
        }
    }

    #[test]
    fn test_on_ack_only_observes() {
        let (outbox, mut rx) = Outbox::channel();
        let mut tracker = AckTracker::new(outbox);
        let from: SocketAddr = "10.0.0.9:8888".parse().unwrap();

        tracker.on_ack(&MessageId::new("1-AP"), from);
        tracker.on_ack(&MessageId::new("1-AP"), from);

        assert_eq!(tracker.observed(), 2);
        assert!(rx.try_recv().is_err());
    }
}
