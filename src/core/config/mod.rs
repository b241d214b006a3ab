//! # Config Module
//!
//! One configuration object for every threshold the engine uses, so the
//! coarse gate, the fine trigger, the ratio test and the confirmation count
//! cannot drift apart between code paths.
//!
//! ## Defaults
//! | Option              | Default | Meaning                                   |
//! |---------------------|---------|-------------------------------------------|
//! | `coarse_threshold`  | 5       | max fingerprint distance kept for report  |
//! | `fine_trigger`      | 5       | max fingerprint distance for fine matching|
//! | `match_threshold`   | 30      | good matches needed to confirm a pair     |
//! | `ratio_threshold`   | 0.75    | nearest / second-nearest cutoff           |
//! | `descriptor_budget` | 100     | max descriptors per image                 |
//! | `fingerprint_bits`  | 64      | global fingerprint width                  |

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest and largest accepted fingerprint widths
pub const MIN_FINGERPRINT_BITS: u32 = 8;
pub const MAX_FINGERPRINT_BITS: u32 = 1024;

/// Thresholds and sizes shared by the extractor and the matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Pairs whose fingerprint distance exceeds this stop at the coarse stage
    pub coarse_threshold: u32,
    /// Fine matching runs only at or below this fingerprint distance
    pub fine_trigger: u32,
    /// Good descriptor matches required to confirm a pair
    pub match_threshold: u32,
    /// Ratio test cutoff, exclusive range (0, 1)
    pub ratio_threshold: f32,
    /// Maximum descriptors extracted per image
    pub descriptor_budget: usize,
    /// Global fingerprint width in bits
    pub fingerprint_bits: u32,
}

impl MatchConfig {
    /// Create a configuration with the default thresholds
    pub fn new() -> Self {
        Self {
            coarse_threshold: 5,
            fine_trigger: 5,
            match_threshold: 30,
            ratio_threshold: 0.75,
            descriptor_budget: 100,
            fingerprint_bits: 64,
        }
    }

    pub fn coarse_threshold(mut self, threshold: u32) -> Self {
        self.coarse_threshold = threshold;
        self
    }

    pub fn fine_trigger(mut self, trigger: u32) -> Self {
        self.fine_trigger = trigger;
        self
    }

    pub fn match_threshold(mut self, threshold: u32) -> Self {
        self.match_threshold = threshold;
        self
    }

    pub fn ratio_threshold(mut self, ratio: f32) -> Self {
        self.ratio_threshold = ratio;
        self
    }

    pub fn descriptor_budget(mut self, budget: usize) -> Self {
        self.descriptor_budget = budget;
        self
    }

    pub fn fingerprint_bits(mut self, bits: u32) -> Self {
        self.fingerprint_bits = bits;
        self
    }

    /// Load a JSON configuration file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ConfigFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check every value before any fingerprint is computed or compared
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_fingerprint_bits(self.fingerprint_bits)?;

        if self.coarse_threshold > self.fingerprint_bits {
            return Err(ConfigError::InvalidThreshold {
                name: "coarse_threshold",
                value: format!(
                    "{} exceeds the fingerprint width of {} bits",
                    self.coarse_threshold, self.fingerprint_bits
                ),
            });
        }

        if self.fine_trigger > self.fingerprint_bits {
            return Err(ConfigError::InvalidThreshold {
                name: "fine_trigger",
                value: format!(
                    "{} exceeds the fingerprint width of {} bits",
                    self.fine_trigger, self.fingerprint_bits
                ),
            });
        }

        if self.match_threshold == 0 {
            return Err(ConfigError::InvalidThreshold {
                name: "match_threshold",
                value: "0 would confirm every candidate pair".to_string(),
            });
        }

        if !(self.ratio_threshold > 0.0 && self.ratio_threshold < 1.0) {
            return Err(ConfigError::InvalidThreshold {
                name: "ratio_threshold",
                value: format!("{} (must be strictly between 0 and 1)", self.ratio_threshold),
            });
        }

        if self.descriptor_budget == 0 {
            return Err(ConfigError::InvalidThreshold {
                name: "descriptor_budget",
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint widths must be a power of two so the hex form is exact
pub fn validate_fingerprint_bits(bits: u32) -> Result<(), ConfigError> {
    if bits.is_power_of_two() && (MIN_FINGERPRINT_BITS..=MAX_FINGERPRINT_BITS).contains(&bits) {
        Ok(())
    } else {
        Err(ConfigError::InvalidFingerprintBits { bits })
    }
}
