//! Relay and replay
//!
//! Coordinator-side forwarding of messages to every peer, and chunked replay
//! of the history buffer to a newly joined peer. Every send is
//! fire-and-forget.

pub mod ack;

pub use self::ack::AckTracker;

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use crate::history::HistoryBuffer;
use crate::protocol::{Envelope, Frame, Outbox};

/// Forwards messages to the broadcast address and replays history
#[derive(Debug, Clone)]
pub struct RelayEngine {
    outbox: Outbox,
    /// Pause after each replayed chunk
    chunk_pacing: Duration,
}

impl RelayEngine {
    pub fn new(outbox: Outbox, chunk_pacing: Duration) -> Self {
        RelayEngine {
            outbox,
            chunk_pacing,
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Sends a frame verbatim to the broadcast address
    pub fn broadcast(&self, frame: Frame) {
        self.outbox.broadcast(frame);
    }

    /// Records a peer's message, re-broadcasts it unmodified and
    /// acknowledges it to the immediate sender.
    ///
    /// `original` is rebroadcast byte for byte so the author's id survives
    /// the relay.
    pub fn relay_and_ack(
        &self,
        history: &mut HistoryBuffer,
        acks: &AckTracker,
        envelope: &Envelope,
        original: Bytes,
        from: SocketAddr,
    ) {
        debug!(id = %envelope.id, from = %from.ip(), "Relaying message");
        history.append(&envelope.payload);
        self.broadcast(Frame::Raw(original));
        acks.send_ack(from, &envelope.id);
    }

    /// Sends the history to `to` as `HISTORY_START`, the snapshot chunks
    /// with a pause after each, then `HISTORY_END`.
    pub fn replay_history(&self, history: &HistoryBuffer, to: SocketAddr) {
        let chunks = history.snapshot();
        info!(
            peer = %to.ip(),
            bytes = history.size(),
            chunks = chunks.len(),
            "Sending history"
        );

        self.outbox.unicast(to, Frame::HistoryStart);
        for chunk in chunks {
            self.outbox.unicast(to, Frame::Raw(chunk));
            self.outbox.pause(self.chunk_pacing);
        }
        self.outbox.unicast(to, Frame::HistoryEnd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Effect, MessageId};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn drain(rx: &mut UnboundedReceiver<Effect>) -> Vec<Effect> {
        let mut effects = Vec::new();
        while let Ok(effect) = rx.try_recv() {
            effects.push(effect);
        }
        effects
    }

    #[test]
    fn test_relay_and_ack() {
        let (outbox, mut rx) = Outbox::channel();
        let relay = RelayEngine::new(outbox.clone(), Duration::from_millis(10));
        let acks = AckTracker::new(outbox);
        let mut history = HistoryBuffer::new(1024);
        let from: SocketAddr = "10.0.0.5:8888".parse().unwrap();

        let wire = Bytes::from_static(b"@@42-AP@@System: hi");
        let envelope = Envelope::decode("@@42-AP@@System: hi").unwrap();
        relay.relay_and_ack(&mut history, &acks, &envelope, wire.clone(), from);

        assert_eq!(history.contents(), "System: hi\n");
        assert_eq!(
            drain(&mut rx),
            vec![
                Effect::Broadcast(Frame::Raw(wire)),
                Effect::Unicast {
                    to: from,
                    frame: Frame::Ack(MessageId::new("42-AP")),
                },
            ]
        );
    }

    #[test]
    fn test_relay_preserves_original_bytes() {
        let (outbox, mut rx) = Outbox::channel();
        let relay = RelayEngine::new(outbox.clone(), Duration::ZERO);
        let acks = AckTracker::new(outbox);
        let mut history = HistoryBuffer::new(1024);
        let from: SocketAddr = "10.0.0.6:8888".parse().unwrap();

        let wire = Bytes::from_static(b"junk@@3-10.0.0.6@@[10.0.0.6]: yo");
        let envelope = Envelope::decode("junk@@3-10.0.0.6@@[10.0.0.6]: yo").unwrap();
        relay.relay_and_ack(&mut history, &acks, &envelope, wire.clone(), from);

        match &drain(&mut rx)[0] {
            Effect::Broadcast(frame) => assert_eq!(frame.to_bytes(), wire),
            other => panic!("Unexpected effect: {:?}", other),
        }
    }

    #[test]
    fn test_replay_history_order() {
        let (outbox, mut rx) = Outbox::channel();
        let pacing = Duration::from_millis(10);
        let relay = RelayEngine::new(outbox, pacing);
        let mut history = HistoryBuffer::with_chunk_size(10_000, 500);
        for i in 0..30 {
            history.append(&format!("[10.0.0.{}]: message {}", i % 4, i));
        }
        let to: SocketAddr = "10.0.0.9:8888".parse().unwrap();

        relay.replay_history(&history, to);
        let effects = drain(&mut rx);

        assert_eq!(
            effects.first(),
            Some(&Effect::Unicast {
                to,
                frame: Frame::HistoryStart
            })
        );
        assert_eq!(
            effects.last(),
            Some(&Effect::Unicast {
                to,
                frame: Frame::HistoryEnd
            })
        );

        let mut joined = Vec::new();
        let mut pauses = 0;
        for effect in &effects[1..effects.len() - 1] {
            match effect {
                Effect::Unicast {
                    to: addr,
                    frame: Frame::Raw(chunk),
                } => {
                    assert_eq!(*addr, to);
                    assert!(chunk.len() <= 500);
                    joined.extend_from_slice(chunk);
                }
                Effect::Pause(d) => {
                    assert_eq!(*d, pacing);
                    pauses += 1;
                }
                other => panic!("Unexpected effect: {:?}", other),
            }
        }
        assert_eq!(joined, history.contents().as_bytes());
        assert_eq!(pauses, history.snapshot().len());
    }

    #[test]
    fn test_replay_empty_history() {
        let (outbox, mut rx) = Outbox::channel();
        let relay = RelayEngine::new(outbox, Duration::from_millis(10));
        let history = HistoryBuffer::new(100);
        let to: SocketAddr = "10.0.0.9:8888".parse().unwrap();

        relay.replay_history(&history, to);

        assert_eq!(
            drain(&mut rx),
            vec![
                Effect::Unicast {
                    to,
                    frame: Frame::HistoryStart
                },
                Effect::Unicast {
                    to,
                    frame: Frame::HistoryEnd
                },
            ]
        );
    }
}
