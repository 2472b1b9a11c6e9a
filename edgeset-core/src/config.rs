//! # Configuration Management
//!
//! Handles all configuration for EdgeSet components. The defaults describe the
//! reference board: 28x28 greyscale examples, 400 in RAM, 800 in a 4 KiB-sector
//! SPI flash, ten classes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub geometry: GeometryConfig,
    pub distance: DistanceConfig,
    pub classifier: ClassifierConfig,
    pub sampling: SamplingConfig,
    pub protocol: ProtocolConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load a configuration from a JSON file. Missing sections fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io {
            message: format!("Failed to read config {:?}: {}", path, e),
            source: e,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text).map_err(|e| Error::Configuration {
            message: format!("invalid config JSON: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Configuration {
            message: e.to_string(),
        })
    }

    /// Largest squared distance between two examples after the shift
    pub fn max_shifted_distance(&self) -> u64 {
        (255u64 * 255 * self.geometry.feature_len as u64) >> self.distance.shift.min(63)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        if self.distance.shift >= 32 {
            return Err(Error::Configuration {
                message: format!("distance shift {} must be below 32", self.distance.shift),
            });
        }
        let max_distance = self.max_shifted_distance();
        if max_distance > u16::MAX as u64 {
            warn!(
                "distance shift {} leaves distances up to {}; values above {} wrap when stored",
                self.distance.shift,
                max_distance,
                u16::MAX
            );
        }
        if self.classifier.k == 0 {
            return Err(Error::Configuration {
                message: "classifier k must be at least 1".to_string(),
            });
        }
        if self.protocol.default_chunk_size == 0 {
            return Err(Error::Configuration {
                message: "default chunk size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Tier sizes and flash layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Feature bytes per example (label byte excluded)
    pub feature_len: usize,
    /// Examples held in the volatile tier
    pub volatile_capacity: usize,
    /// Examples held in the persistent tier; also the subset size
    pub persistent_capacity: usize,
    /// Erase sector size of the persistent device
    pub sector_size: usize,
    /// Device address of the first persistent sector
    pub base_address: u32,
    /// Number of classes a label byte may name
    pub num_classes: usize,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            feature_len: 28 * 28,
            volatile_capacity: 400,
            persistent_capacity: 800,
            sector_size: 4096,
            base_address: 0x0020_1000,
            num_classes: 10,
        }
    }
}

impl GeometryConfig {
    /// Feature bytes plus the trailing label byte
    pub fn record_size(&self) -> usize {
        self.feature_len + 1
    }

    pub fn total_examples(&self) -> usize {
        self.volatile_capacity + self.persistent_capacity
    }

    /// Whole records per erase sector; records never straddle sectors
    pub fn examples_per_sector(&self) -> usize {
        self.sector_size / self.record_size()
    }

    /// Sectors needed to hold the persistent tier
    pub fn sector_count(&self) -> usize {
        let per_sector = self.examples_per_sector().max(1);
        (self.persistent_capacity + per_sector - 1) / per_sector
    }

    /// Bytes of device address space occupied by the persistent tier
    pub fn persistent_span(&self) -> usize {
        self.sector_count() * self.sector_size
    }

    /// Subset size used for classification and migration
    pub fn subset_size(&self) -> usize {
        self.persistent_capacity
    }

    pub fn validate(&self) -> Result<()> {
        if self.feature_len == 0 {
            return Err(Error::Configuration {
                message: "feature_len must be positive".to_string(),
            });
        }
        if self.examples_per_sector() == 0 {
            return Err(Error::Configuration {
                message: format!(
                    "sector size {} cannot hold a {}-byte record",
                    self.sector_size,
                    self.record_size()
                ),
            });
        }
        if self.num_classes == 0 || self.num_classes > 256 {
            return Err(Error::Configuration {
                message: format!("num_classes {} must be in 1..=256", self.num_classes),
            });
        }
        if self.total_examples() == 0 {
            return Err(Error::Configuration {
                message: "at least one example slot is required".to_string(),
            });
        }
        let end = self.base_address as u64 + self.persistent_span() as u64;
        if end > u32::MAX as u64 + 1 {
            return Err(Error::Configuration {
                message: format!("persistent tier ends past the 32-bit address space ({:#x})", end),
            });
        }
        // Largest feature self-dot must fit the u32 accumulator
        let max_dot = self.feature_len as u64 * 255 * 255 * 2;
        if max_dot > u32::MAX as u64 {
            return Err(Error::Configuration {
                message: format!(
                    "feature_len {} overflows the 32-bit distance accumulator",
                    self.feature_len
                ),
            });
        }
        Ok(())
    }
}

/// Distance quantization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Right shift applied to the squared distance before truncating to 16 bits.
    /// 12 suits 784 bytes of 8-bit pixels; re-derive it when feature_len changes.
    pub shift: u32,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self { shift: 12 }
    }
}

/// k-NN settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub k: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { k: 3 }
    }
}

/// Subset sampling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Seed used until the host sends a reseed request
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { seed: 1 }
    }
}

/// Host protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Values per line when a request omits the chunk size
    pub default_chunk_size: usize,
    /// Echo every received data line back to the host
    pub echo_input: bool,
    pub on_error: FailurePolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: 8,
            echo_input: true,
            on_error: FailurePolicy::Halt,
        }
    }
}

/// What the session does after reporting an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop serving; the binary exits non-zero
    Halt,
    /// Drop the failed request and keep serving
    Continue,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}
