//! # Fingerprint Module
//!
//! Turns one decoded image into a [`FingerprintRecord`]: a global perceptual
//! hash plus a set of local binary descriptors.
//!
//! ## Signals
//! - **Global** - DCT perceptual hash, compared by Hamming distance. Cheap;
//!   used to prune the pair space.
//! - **Local** - up to `descriptor_budget` oriented FAST / rotated BRIEF
//!   descriptors, compared with a nearest-neighbour ratio test. Expensive;
//!   only run on pairs the global signal let through.
//!
//! ## Performance Optimizations
//! - Uses `zune-jpeg` for faster JPEG decoding
//! - Uses `fast_image_resize` to shrink large scans before corner detection
//!
//! ## Example
//! ```rust,ignore
//! use card_dedup::core::config::MatchConfig;
//! use card_dedup::core::fingerprint::{FingerprintExtractor, ImageIdentity};
//!
//! let extractor = FingerprintExtractor::new(&MatchConfig::default())?;
//! let record = extractor.extract_file(ImageIdentity::from("card-0001"), &path)?;
//! ```

pub mod descriptors;
pub mod fast_decode;
pub mod fast_resize;
mod global;
mod orb;

pub use descriptors::{descriptor_distance, DescriptorSet, DESCRIPTOR_BYTES};
pub use global::{GlobalFingerprint, PerceptualHasher};
pub use orb::{ExtractorConfig, Keypoint, OrbExtractor};

use crate::core::config::MatchConfig;
use crate::error::{ConfigError, DecodeError};
use fast_decode::FastDecoder;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Stable key naming one image across the corpus
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageIdentity(String);

impl ImageIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ImageIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the matcher knows about one image. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub identity: ImageIdentity,
    pub global_fingerprint: GlobalFingerprint,
    /// May be empty for featureless artwork
    pub local_descriptors: DescriptorSet,
}

/// Computes both signals for an image
pub struct FingerprintExtractor {
    hasher: PerceptualHasher,
    orb: OrbExtractor,
}

impl FingerprintExtractor {
    /// Build an extractor for the configured fingerprint width and budget
    pub fn new(config: &MatchConfig) -> Result<Self, ConfigError> {
        Self::with_extractor_config(config, ExtractorConfig::default())
    }

    pub fn with_extractor_config(
        config: &MatchConfig,
        extractor: ExtractorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            hasher: PerceptualHasher::new(config.fingerprint_bits)?,
            orb: OrbExtractor::new(extractor, config.descriptor_budget),
        })
    }

    pub fn fingerprint_bits(&self) -> u32 {
        self.hasher.bits()
    }

    /// Fingerprint a decoded image
    pub fn extract(
        &self,
        identity: ImageIdentity,
        image: &DynamicImage,
    ) -> Result<FingerprintRecord, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::EmptyImage {
                identity: identity.to_string(),
            });
        }

        let global_fingerprint = self.hasher.hash_image(image);
        let local_descriptors = self.orb.extract(image)?;

        tracing::debug!(
            "Fingerprinted {} ({}, {} descriptors)",
            identity,
            global_fingerprint,
            local_descriptors.len()
        );

        Ok(FingerprintRecord {
            identity,
            global_fingerprint,
            local_descriptors,
        })
    }

    /// Decode a file and fingerprint it
    pub fn extract_file(
        &self,
        identity: ImageIdentity,
        path: &Path,
    ) -> Result<FingerprintRecord, DecodeError> {
        let image = FastDecoder::decode(path)?;
        self.extract(identity, &image)
    }
}
