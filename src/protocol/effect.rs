use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use super::message::Frame;

/// An action requested by the protocol engine, carried out by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send a frame to one address
    Unicast { to: SocketAddr, frame: Frame },
    /// Send a frame to the segment broadcast address
    Broadcast(Frame),
    /// Wait before executing the next effect
    Pause(Duration),
    /// Show a line on the operator console
    Display(String),
}

/// Sending half of the engine's effect queue
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Effect>,
}

impl Outbox {
    /// Creates an outbox and the receiver the driver drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Effect>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbox { tx }, rx)
    }

    pub fn unicast(&self, to: SocketAddr, frame: Frame) {
        self.push(Effect::Unicast { to, frame });
    }

    pub fn broadcast(&self, frame: Frame) {
        self.push(Effect::Broadcast(frame));
    }

    pub fn pause(&self, duration: Duration) {
        self.push(Effect::Pause(duration));
    }

    pub fn display(&self, line: impl Into<String>) {
        self.push(Effect::Display(line.into()));
    }

    fn push(&self, effect: Effect) {
        if let Err(e) = self.tx.send(effect) {
            debug!(effect = ?e.0, "Effect dropped, driver has shut down");
        }
    }
}
