//! Global fingerprint: a DCT perceptual hash.
//!
//! The image is reduced to grayscale, resized, run through a 2D DCT, and the
//! low-frequency `w x h` block is kept. Each bit records whether a
//! coefficient lies above the block median. Recompression, resizing and mild
//! colour shifts move only a few coefficients across the median, so
//! near-identical artwork lands a small Hamming distance apart.

use crate::core::config::validate_fingerprint_bits;
use crate::error::ConfigError;
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};

/// Fixed-width bit string, canonically rendered as `bits / 4` hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GlobalFingerprint {
    bytes: Vec<u8>,
}

impl GlobalFingerprint {
    /// Build from raw bytes; the bit width must be a supported power of two
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ConfigError> {
        validate_fingerprint_bits((bytes.len() * 8) as u32)?;
        Ok(Self { bytes })
    }

    /// Parse the canonical hex form
    pub fn from_hex(value: &str) -> Result<Self, ConfigError> {
        let bytes = hex::decode(value).map_err(|e| ConfigError::InvalidFingerprintHex {
            value: value.to_string(),
            reason: e.to_string(),
        })?;

        Self::from_bytes(bytes).map_err(|_| ConfigError::InvalidFingerprintHex {
            value: value.to_string(),
            reason: format!("{} hex digits is not a supported width", value.len()),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bit_count(&self) -> u32 {
        (self.bytes.len() * 8) as u32
    }

    /// Hamming distance. Fingerprints of different widths are never
    /// comparable.
    pub fn distance(&self, other: &Self) -> Result<u32, ConfigError> {
        if self.bytes.len() != other.bytes.len() {
            return Err(ConfigError::FingerprintWidthMismatch {
                left: self.bit_count(),
                right: other.bit_count(),
            });
        }

        Ok(self
            .bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum())
    }
}

impl TryFrom<String> for GlobalFingerprint {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<GlobalFingerprint> for String {
    fn from(fingerprint: GlobalFingerprint) -> Self {
        fingerprint.to_hex()
    }
}

impl std::fmt::Display for GlobalFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// DCT grid for a bit width: square for even powers, twice as wide as tall
/// for odd ones.
fn grid_for_bits(bits: u32) -> (u32, u32) {
    let exponent = bits.trailing_zeros();
    let width = 1 << exponent.div_ceil(2);
    let height = 1 << (exponent / 2);
    (width, height)
}

/// Perceptual hasher producing fingerprints of one fixed width
pub struct PerceptualHasher {
    bits: u32,
    hasher: image_hasher::Hasher,
}

impl PerceptualHasher {
    pub fn new(bits: u32) -> Result<Self, ConfigError> {
        validate_fingerprint_bits(bits)?;

        let (width, height) = grid_for_bits(bits);
        let hasher = HasherConfig::new()
            .hash_size(width, height)
            .hash_alg(HashAlg::Median)
            .preproc_dct()
            .to_hasher();

        Ok(Self { bits, hasher })
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn hash_image(&self, image: &DynamicImage) -> GlobalFingerprint {
        let hash = self.hasher.hash_image(image);
        let bytes = hash.as_bytes().to_vec();
        debug_assert_eq!(bytes.len() * 8, self.bits as usize);

        GlobalFingerprint { bytes }
    }
}
