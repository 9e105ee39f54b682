//! LR Chat: store-and-forward broadcast chat for star-topology wireless segments
//!
//! One coordinator relays every message onto the segment broadcast address,
//! keeps a bounded history and replays it to peers that join late. Peers
//! display what they receive and acknowledge each message.

pub mod core;
pub mod history;
pub mod network;
pub mod protocol;
pub mod relay;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Config, Error, Result, Role};
pub use crate::history::HistoryBuffer;
pub use crate::network::{ChatSocket, Console, Node};
pub use crate::protocol::{Effect, Envelope, Frame, MessageId, ProtocolState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
