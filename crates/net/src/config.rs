use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::{
    DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT, DEFAULT_PACKET_LENGTH, MAX_PACKET_LENGTH,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub bind_address: IpAddr,
    pub control_port: u16,
    pub data_port: u16,
    pub client_data_port: u16,
    /// Both peers must agree on this; datagrams are neither length-prefixed nor checked.
    pub packet_length: usize,
    pub max_peers: usize,
    pub lobby_capacity: usize,
    pub require_full: bool,
    pub connect_timeout_ms: u64,
    pub receive_timeout_ms: Option<u64>,
    pub tick_rate: u32,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            control_port: DEFAULT_CONTROL_PORT,
            data_port: DEFAULT_DATA_PORT,
            client_data_port: DEFAULT_DATA_PORT,
            packet_length: DEFAULT_PACKET_LENGTH,
            max_peers: 32,
            lobby_capacity: 4,
            require_full: false,
            connect_timeout_ms: 5000,
            receive_timeout_ms: None,
            tick_rate: 30,
        }
    }
}

impl NetConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: NetConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_length == 0 {
            return Err(ConfigError::Invalid("packet_length must be greater than zero"));
        }
        if self.packet_length > MAX_PACKET_LENGTH {
            return Err(ConfigError::Invalid("packet_length exceeds the UDP payload limit"));
        }
        if self.lobby_capacity == 0 {
            return Err(ConfigError::Invalid("lobby_capacity must be greater than zero"));
        }
        if self.max_peers == 0 {
            return Err(ConfigError::Invalid("max_peers must be greater than zero"));
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be greater than zero"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }
}
