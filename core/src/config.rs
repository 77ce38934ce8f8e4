//! Controller configuration
//!
//! Serialized as JSON. Only the mesh key is required; every other field
//! falls back to the defaults of the deployed firmware.

use crate::protocol::MeshKey;
use crate::transmit::{DebounceConfig, SchedulerTiming, DEFAULT_MAX_QUEUE_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ADV_INTERVAL_MIN: u16 = 0x20;
pub const DEFAULT_ADV_INTERVAL_MAX: u16 = 0x40;
pub const DEFAULT_ADV_DURATION_MS: u16 = 50;
pub const DEFAULT_ADV_GAP_MS: u16 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid mesh key: {0}")]
    InvalidMeshKey(String),
    #[error("adv_interval_max ({max}) must be >= adv_interval_min ({min})")]
    InvalidIntervals { min: u16, max: u16 },
    #[error("max_queue_size must be greater than 0")]
    InvalidQueueSize,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What happens to queued commands when a pairing session takes the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingQueuePolicy {
    /// Keep them parked and drain after pairing ends
    #[default]
    Retain,
    /// Discard them when pairing starts
    Clear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub mesh_key: MeshKey,

    /// Advertising interval bounds, units of 0.625 ms
    #[serde(default = "default_adv_interval_min")]
    pub adv_interval_min: u16,
    #[serde(default = "default_adv_interval_max")]
    pub adv_interval_max: u16,

    /// How long each queued frame is advertised
    #[serde(default = "default_adv_duration_ms")]
    pub adv_duration_ms: u16,

    /// Radio silence between two frames
    #[serde(default = "default_adv_gap_ms")]
    pub adv_gap_ms: u16,

    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    #[serde(default)]
    pub debounce: DebounceConfig,

    #[serde(default)]
    pub pairing_queue_policy: PairingQueuePolicy,
}

fn default_adv_interval_min() -> u16 {
    DEFAULT_ADV_INTERVAL_MIN
}

fn default_adv_interval_max() -> u16 {
    DEFAULT_ADV_INTERVAL_MAX
}

fn default_adv_duration_ms() -> u16 {
    DEFAULT_ADV_DURATION_MS
}

fn default_adv_gap_ms() -> u16 {
    DEFAULT_ADV_GAP_MS
}

fn default_max_queue_size() -> usize {
    DEFAULT_MAX_QUEUE_SIZE
}

impl ControllerConfig {
    pub fn new(mesh_key: MeshKey) -> Self {
        Self {
            mesh_key,
            adv_interval_min: DEFAULT_ADV_INTERVAL_MIN,
            adv_interval_max: DEFAULT_ADV_INTERVAL_MAX,
            adv_duration_ms: DEFAULT_ADV_DURATION_MS,
            adv_gap_ms: DEFAULT_ADV_GAP_MS,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            debounce: DebounceConfig::default(),
            pairing_queue_policy: PairingQueuePolicy::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ControllerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adv_interval_max < self.adv_interval_min {
            return Err(ConfigError::InvalidIntervals {
                min: self.adv_interval_min,
                max: self.adv_interval_max,
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::InvalidQueueSize);
        }
        Ok(())
    }

    /// Set the upper interval bound, raising it to the lower bound if needed
    pub fn set_adv_interval_max(&mut self, value: u16) {
        self.adv_interval_max = value.max(self.adv_interval_min);
    }

    pub fn scheduler_timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            interval_min: self.adv_interval_min,
            interval_max: self.adv_interval_max,
            duration_ms: self.adv_duration_ms as u64,
            gap_ms: self.adv_gap_ms as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config = ControllerConfig::from_json(r#"{"mesh_key": "30323336"}"#).unwrap();
        assert_eq!(config.mesh_key, MeshKey::new(*b"0236"));
        assert_eq!(config.adv_interval_min, 0x20);
        assert_eq!(config.adv_interval_max, 0x40);
        assert_eq!(config.adv_duration_ms, 50);
        assert_eq!(config.adv_gap_ms, 10);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.debounce.settle_ms, 100);
        assert_eq!(config.debounce.min_interval_ms, 300);
        assert_eq!(config.pairing_queue_policy, PairingQueuePolicy::Retain);
    }

    #[test]
    fn test_missing_mesh_key_rejected() {
        assert!(ControllerConfig::from_json("{}").is_err());
    }

    #[test]
    fn test_bad_mesh_key_rejected() {
        let err = ControllerConfig::from_json(r#"{"mesh_key": "3032"}"#).unwrap_err();
        assert!(err.to_string().contains("8 hex characters"));
    }

    #[test]
    fn test_inverted_intervals_rejected() {
        let json = r#"{"mesh_key": "30323336", "adv_interval_min": 64, "adv_interval_max": 32}"#;
        assert!(matches!(
            ControllerConfig::from_json(json),
            Err(ConfigError::InvalidIntervals { min: 64, max: 32 })
        ));
    }

    #[test]
    fn test_zero_queue_rejected() {
        let mut config = ControllerConfig::new(MeshKey::new([0; 4]));
        config.max_queue_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidQueueSize)));
    }

    #[test]
    fn test_interval_max_setter_clamps() {
        let mut config = ControllerConfig::new(MeshKey::new([0; 4]));
        config.set_adv_interval_max(0x10);
        assert_eq!(config.adv_interval_max, config.adv_interval_min);
    }

    #[test]
    fn test_policy_serialization() {
        let mut config = ControllerConfig::new(MeshKey::new(*b"0236"));
        config.pairing_queue_policy = PairingQueuePolicy::Clear;
        let json = config.to_json_pretty().unwrap();
        assert!(json.contains("\"clear\""));
        let back = ControllerConfig::from_json(&json).unwrap();
        assert_eq!(back.pairing_queue_policy, PairingQueuePolicy::Clear);
    }
}
