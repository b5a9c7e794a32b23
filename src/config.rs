//! Transfer tuning knobs

use crate::block::DEFAULT_BLOCK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Byte-mode capacity of a version 40 QR code at error-correction level M
pub const DEFAULT_QR_CAPACITY: usize = 2331;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How fast the carousel flips between QR codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DisplaySpeed {
    /// Two codes per second
    #[default]
    Fast,
    /// One code per second
    Normal,
}

impl DisplaySpeed {
    pub fn interval(&self) -> Duration {
        match self {
            DisplaySpeed::Fast => Duration::from_millis(500),
            DisplaySpeed::Normal => Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransferConfig {
    /// Source block size in bytes
    pub block_size: usize,
    /// Extra packets over `k`, as a fraction
    pub redundancy: f64,
    /// Hard ceiling on encoder draws, as a multiple of the target packet count
    pub iteration_factor: usize,
    /// Practical byte capacity of one QR code
    pub qr_capacity: usize,
    /// Fraction of `qr_capacity` a serialized packet may use
    pub max_packet_ratio: f64,
    pub speed: DisplaySpeed,
    /// Emit the source blocks first
    pub systematic: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            redundancy: 0.2,
            iteration_factor: 5,
            qr_capacity: DEFAULT_QR_CAPACITY,
            max_packet_ratio: 0.9,
            speed: DisplaySpeed::default(),
            systematic: true,
        }
    }
}

impl TransferConfig {
    /// Load from a JSON file; absent keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("blockSize must be positive".into()));
        }
        if !self.redundancy.is_finite() || self.redundancy < 0.0 {
            return Err(ConfigError::Invalid("redundancy must be non-negative".into()));
        }
        if self.iteration_factor == 0 {
            return Err(ConfigError::Invalid("iterationFactor must be positive".into()));
        }
        if !(self.max_packet_ratio > 0.0 && self.max_packet_ratio <= 1.0) {
            return Err(ConfigError::Invalid("maxPacketRatio must be in (0, 1]".into()));
        }
        Ok(())
    }

    /// Largest serialized packet, in bytes, that still fits one code
    pub fn max_packet_bytes(&self) -> usize {
        (self.qr_capacity as f64 * self.max_packet_ratio).floor() as usize
    }

    /// Packets to emit for `k` source blocks: `ceil(k * (1 + redundancy))`
    pub fn target_packets(&self, k: usize) -> usize {
        // Epsilon keeps float noise from bumping an exact product up a packet
        ((k as f64) * (1.0 + self.redundancy) - 1e-9).ceil().max(0.0) as usize
    }

    /// Encoder draws allowed before giving up on reaching the target
    pub fn max_iterations(&self, k: usize) -> usize {
        self.target_packets(k) * self.iteration_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.block_size, 200);
        assert_eq!(config.target_packets(25), 30);
        assert_eq!(config.max_iterations(25), 150);
        assert_eq!(config.max_packet_bytes(), 2097);
        assert_eq!(config.speed.interval(), Duration::from_millis(500));
        assert_eq!(DisplaySpeed::Normal.interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"blockSize": 120, "speed": "normal"}}"#).unwrap();

        let config = TransferConfig::load(file.path()).unwrap();
        assert_eq!(config.block_size, 120);
        assert_eq!(config.speed, DisplaySpeed::Normal);
        assert_eq!(config.qr_capacity, DEFAULT_QR_CAPACITY);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"maxPacketRatio": 1.5}}"#).unwrap();
        assert!(matches!(
            TransferConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let config = TransferConfig {
            block_size: 0,
            ..TransferConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
