use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Role of a device in the star topology, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Owns the history and relays every message to all peers
    Coordinator,
    /// Joins via handshake and exchanges messages through the coordinator
    #[default]
    Peer,
}

impl Role {
    /// Sender tag used in message ids and display prefixes.
    ///
    /// The coordinator always uses `AP`; a peer uses its own address.
    pub fn tag(&self, local_ip: IpAddr) -> String {
        match self {
            Role::Coordinator => super::COORDINATOR_TAG.to_string(),
            Role::Peer => local_ip.to_string(),
        }
    }

    /// Display prefix attached to operator-submitted text, e.g. `[AP]`
    pub fn origin_prefix(&self, local_ip: IpAddr) -> String {
        format!("[{}]", self.tag(local_ip))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Coordinator => write!(f, "coordinator"),
            Role::Peer => write!(f, "peer"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "coordinator" | "ap" => Ok(Role::Coordinator),
            "peer" | "sta" => Ok(Role::Peer),
            other => Err(Error::config(format!("Unknown role: {}", other))),
        }
    }
}

/// Configuration for a chat node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Role selected at startup
    #[serde(default)]
    pub role: Role,
    /// Addresses and port
    #[serde(default)]
    pub network: NetworkConfig,
    /// History buffer sizing
    #[serde(default)]
    pub history: HistoryConfig,
    /// Timers and pacing
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Fixed application port
    pub port: u16,
    /// Local address to bind to
    pub bind_ip: IpAddr,
    /// Broadcast address of the local segment
    pub broadcast_ip: IpAddr,
    /// Coordinator address, target of the join handshake
    pub coordinator_ip: IpAddr,
    /// Own address; detected at startup when absent
    pub local_ip: Option<IpAddr>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            port: super::DEFAULT_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 4, 255)),
            coordinator_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 4, 1)),
            local_ip: None,
        }
    }
}

impl NetworkConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    pub fn broadcast_addr(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_ip, self.port)
    }

    pub fn coordinator_addr(&self) -> SocketAddr {
        SocketAddr::new(self.coordinator_ip, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Capacity of the history buffer in bytes
    pub capacity: usize,
    /// Maximum size of one replay chunk in bytes
    pub chunk_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            capacity: super::HISTORY_CAPACITY,
            chunk_size: super::HISTORY_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause after each replayed history chunk
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub chunk_pacing: Duration,
    /// Coordinator liveness broadcast period
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub heartbeat_interval: Duration,
    /// Pause between control loop iterations
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub poll_interval: Duration,
    /// How long a peer waits for the next replay chunk before giving up
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub history_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            chunk_pacing: Duration::from_millis(10),
            heartbeat_interval: Duration::from_secs(30),
            poll_interval: Duration::from_millis(10),
            history_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Loads a configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        super::serde::from_toml(&text)
    }

    /// Checks that sizes and intervals are usable
    pub fn validate(&self) -> Result<()> {
        if self.history.capacity == 0 {
            return Err(Error::config("history.capacity must be positive"));
        }
        if self.history.chunk_size == 0 || self.history.chunk_size > super::MAX_DATAGRAM_SIZE {
            return Err(Error::config(format!(
                "history.chunk_size must be between 1 and {}",
                super::MAX_DATAGRAM_SIZE
            )));
        }
        if self.timing.heartbeat_interval.is_zero() {
            return Err(Error::config("timing.heartbeat_interval must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tags() {
        let ip: IpAddr = "192.168.4.2".parse().unwrap();
        assert_eq!(Role::Coordinator.tag(ip), "AP");
        assert_eq!(Role::Peer.tag(ip), "192.168.4.2");
        assert_eq!(Role::Coordinator.origin_prefix(ip), "[AP]");
        assert_eq!(Role::Peer.origin_prefix(ip), "[192.168.4.2]");
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("coordinator".parse::<Role>().unwrap(), Role::Coordinator);
        assert_eq!("AP".parse::<Role>().unwrap(), Role::Coordinator);
        assert_eq!("Peer".parse::<Role>().unwrap(), Role::Peer);
        assert!("relay".parse::<Role>().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.role, Role::Peer);
        assert_eq!(config.network.port, 8888);
        assert_eq!(config.network.broadcast_addr().to_string(), "192.168.4.255:8888");
        assert_eq!(config.history.capacity, 102_400);
        assert_eq!(config.history.chunk_size, 500);
        assert_eq!(config.timing.heartbeat_interval, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let text = r#"
            role = "coordinator"

            [network]
            port = 9999
            local_ip = "10.0.0.1"

            [timing]
            heartbeat_interval = 2.5
        "#;
        let config: Config = super::super::serde::from_toml(text).unwrap();
        assert_eq!(config.role, Role::Coordinator);
        assert_eq!(config.network.port, 9999);
        assert_eq!(config.network.local_ip, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(config.timing.heartbeat_interval, Duration::from_millis(2500));
        // untouched sections keep their defaults
        assert_eq!(config.history.chunk_size, 500);
        assert_eq!(config.timing.chunk_pacing, Duration::from_millis(10));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.history.chunk_size = 4096;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.history.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.timing.heartbeat_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
