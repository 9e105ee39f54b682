//! Core types and constants for the chat relay
//!
//! This module contains the error type, configuration and the fixed
//! protocol constants shared by every other module.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::{Config, HistoryConfig, NetworkConfig, Role, TimingConfig};

/// Default application port
pub const DEFAULT_PORT: u16 = 8888;

/// Largest inbound datagram payload that is read; the rest is truncated
pub const MAX_DATAGRAM_SIZE: usize = 511;

/// Default history capacity in bytes (100 KB)
pub const HISTORY_CAPACITY: usize = 102_400;

/// Default replay chunk size in bytes
pub const HISTORY_CHUNK_SIZE: usize = 500;

/// Sender tag used by the coordinator
pub const COORDINATOR_TAG: &str = "AP";
