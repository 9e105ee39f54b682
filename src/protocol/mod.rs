//! Protocol implementation module
//!
//! This module defines the wire framing, the datagram codec, the effects the
//! engine emits and the per-role protocol state machine.

pub mod codec;
pub mod effect;
pub mod message;
pub mod state;

pub use self::codec::FrameCodec;
pub use self::effect::{Effect, Outbox};
pub use self::message::{Envelope, Frame, Inbound, MessageId};
pub use self::state::{ProtocolState, RoleHandler, StateInfo};
