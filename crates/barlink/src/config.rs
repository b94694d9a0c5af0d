// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh session configuration.
//!
//! All timing constants of the presence and reconnect machinery live here.
//! Defaults are the reference values: a 2 s heartbeat, peers declared dead
//! after three missed beats, a 1 s reconnect debounce and a 3 s cooldown.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Upper bound for every timing value, derived ones included.
pub const MAX_TIMING: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Mesh session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Heartbeat broadcast period in milliseconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Consecutive missed heartbeats before a peer is declared dead
    #[serde(default = "default_timeout_beats")]
    pub peer_timeout_beats: u32,

    /// Window that coalesces bursts of reconnect triggers (milliseconds)
    #[serde(default = "default_debounce")]
    pub reconnect_debounce_ms: u64,

    /// Minimum spacing between non-forced reconnects (milliseconds)
    #[serde(default = "default_cooldown")]
    pub reconnect_cooldown_ms: u64,

    /// Delay between leaving and rejoining the room (milliseconds)
    #[serde(default = "default_rejoin_grace")]
    pub rejoin_grace_ms: u64,

    /// Delay before announcing after a (re)join (milliseconds)
    #[serde(default = "default_announce_delay")]
    pub announce_delay_ms: u64,

    /// Buffered status events per subscriber before it lags
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Queued commands towards the session task
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

fn default_heartbeat_interval() -> u64 {
    2000
}

fn default_timeout_beats() -> u32 {
    3
}

fn default_debounce() -> u64 {
    1000
}

fn default_cooldown() -> u64 {
    3000
}

fn default_rejoin_grace() -> u64 {
    100
}

fn default_announce_delay() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    256
}

fn default_command_capacity() -> usize {
    64
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval(),
            peer_timeout_beats: default_timeout_beats(),
            reconnect_debounce_ms: default_debounce(),
            reconnect_cooldown_ms: default_cooldown(),
            rejoin_grace_ms: default_rejoin_grace(),
            announce_delay_ms: default_announce_delay(),
            event_capacity: default_event_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

impl MeshConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get heartbeat interval as Duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Silence after which a peer is expired (interval x missed beats).
    pub fn peer_timeout(&self) -> Duration {
        self.heartbeat_interval()
            .saturating_mul(self.peer_timeout_beats)
    }

    pub fn reconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.reconnect_debounce_ms)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_millis(self.reconnect_cooldown_ms)
    }

    pub fn rejoin_grace(&self) -> Duration {
        Duration::from_millis(self.rejoin_grace_ms)
    }

    pub fn announce_delay(&self) -> Duration {
        Duration::from_millis(self.announce_delay_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "heartbeat_interval_ms cannot be 0".into(),
            ));
        }
        if self.peer_timeout_beats == 0 {
            return Err(ConfigError::InvalidValue(
                "peer_timeout_beats cannot be 0".into(),
            ));
        }
        let timings = [
            ("heartbeat_interval_ms", self.heartbeat_interval()),
            ("peer_timeout", self.peer_timeout()),
            ("reconnect_debounce_ms", self.reconnect_debounce()),
            ("reconnect_cooldown_ms", self.reconnect_cooldown()),
            ("rejoin_grace_ms", self.rejoin_grace()),
            ("announce_delay_ms", self.announce_delay()),
        ];
        for (name, value) in timings {
            if value > MAX_TIMING {
                return Err(ConfigError::InvalidValue(format!(
                    "{} exceeds {}s",
                    name,
                    MAX_TIMING.as_secs()
                )));
            }
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "event_capacity cannot be 0".into(),
            ));
        }
        if self.command_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "command_capacity cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MeshConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(2000));
        assert_eq!(config.peer_timeout(), Duration::from_millis(6000));
        assert_eq!(config.reconnect_debounce(), Duration::from_millis(1000));
        assert_eq!(config.reconnect_cooldown(), Duration::from_millis(3000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MeshConfig = serde_json::from_str(r#"{"heartbeat_interval_ms": 500}"#).unwrap();
        assert_eq!(config.heartbeat_interval_ms, 500);
        assert_eq!(config.peer_timeout(), Duration::from_millis(1500));
        assert_eq!(config.rejoin_grace_ms, 100);
    }

    #[test]
    fn test_validation_zero_interval() {
        let config = MeshConfig {
            heartbeat_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_beats() {
        let config = MeshConfig {
            peer_timeout_beats: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_validation_overflow() {
        let config = MeshConfig {
            heartbeat_interval_ms: u64::MAX,
            peer_timeout_beats: u32::MAX,
            ..Default::default()
        };
        assert_eq!(config.peer_timeout(), Duration::MAX);
        assert!(config.validate().is_err());

        // each factor is fine on its own, the product is not
        let config = MeshConfig {
            heartbeat_interval_ms: 60_000,
            peer_timeout_beats: 10_000,
            ..Default::default()
        };
        assert!(config.heartbeat_interval() <= MAX_TIMING);
        assert!(config.validate().is_err());

        let config = MeshConfig {
            reconnect_cooldown_ms: u64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MeshConfig {
            heartbeat_interval_ms: 60_000,
            peer_timeout_beats: 1440,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.json");
        let config = MeshConfig {
            reconnect_cooldown_ms: 4500,
            ..Default::default()
        };
        config.to_file(&path).unwrap();

        let loaded = MeshConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.json");
        std::fs::write(&path, r#"{"event_capacity": 0}"#).unwrap();
        assert!(MeshConfig::from_file(&path).is_err());
    }
}
