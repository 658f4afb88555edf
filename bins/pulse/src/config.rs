use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug)]
pub struct PulseConfig {
    #[serde(default = "defaults::shm_file_path")]
    pub shm_file_path: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default = "defaults::payload_size")]
    pub payload_size: u32,
    #[serde(default = "defaults::message_count")]
    pub message_count: usize,
    #[serde(default = "defaults::message_size")]
    pub message_size: usize,
    #[serde(default = "defaults::peer_timeout_ms")]
    pub peer_timeout_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn shm_file_path() -> String {
        "/tmp/basalt_duplex".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn payload_size() -> u32 {
        4096
    }

    pub fn message_count() -> usize {
        1024
    }

    pub fn message_size() -> usize {
        512
    }

    pub fn peer_timeout_ms() -> u64 {
        15_000
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            shm_file_path: defaults::shm_file_path(),
            log_level: defaults::log_level(),
            payload_size: defaults::payload_size(),
            message_count: defaults::message_count(),
            message_size: defaults::message_size(),
            peer_timeout_ms: defaults::peer_timeout_ms(),
        }
    }
}

impl PulseConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: PulseConfig = toml::from_str(&raw)?;
        Ok(config)
    }
}
