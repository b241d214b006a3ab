//! Fixed-layout storage for local binary descriptors.
//!
//! A `DescriptorSet` is one contiguous byte buffer holding `len` descriptors
//! of `width` bytes each. The width is checked when the set is built, so the
//! matcher never has to guard against ragged rows.

use crate::error::ConfigError;

/// Bytes per descriptor produced by the built-in extractor (256 tests)
pub const DESCRIPTOR_BYTES: usize = 32;

/// Ordered sequence of equal-width binary descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSet {
    width: usize,
    data: Vec<u8>,
}

impl DescriptorSet {
    /// Empty set for descriptors of `width` bytes
    pub fn new(width: usize) -> Result<Self, ConfigError> {
        if width == 0 {
            return Err(ConfigError::MalformedDescriptorBlob { len: 0, width });
        }
        Ok(Self {
            width,
            data: Vec::new(),
        })
    }

    /// Empty set with the built-in descriptor width
    pub fn empty() -> Self {
        Self {
            width: DESCRIPTOR_BYTES,
            data: Vec::new(),
        }
    }

    /// Wrap a stored blob. Its length must be a whole number of descriptors.
    pub fn from_blob(width: usize, data: Vec<u8>) -> Result<Self, ConfigError> {
        if width == 0 || data.len() % width != 0 {
            return Err(ConfigError::MalformedDescriptorBlob {
                len: data.len(),
                width,
            });
        }
        Ok(Self { width, data })
    }

    /// Build from individual descriptors, all of which must share one width
    pub fn from_descriptors<I, D>(width: usize, descriptors: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>,
    {
        let mut set = Self::new(width)?;
        for descriptor in descriptors {
            set.push(descriptor.as_ref())?;
        }
        Ok(set)
    }

    /// Append one descriptor
    pub fn push(&mut self, descriptor: &[u8]) -> Result<(), ConfigError> {
        if descriptor.len() != self.width {
            return Err(ConfigError::DescriptorWidthMismatch {
                left: self.width,
                right: descriptor.len(),
            });
        }
        self.data.extend_from_slice(descriptor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.width)?;
        self.data.get(start..start.checked_add(self.width)?)
    }

    pub fn iter(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(self.width)
    }

    /// Raw blob, `len() * width()` bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Keep at most `count` descriptors
    pub fn truncate(&mut self, count: usize) {
        self.data.truncate(count.saturating_mul(self.width));
    }
}

impl From<Vec<[u8; DESCRIPTOR_BYTES]>> for DescriptorSet {
    fn from(rows: Vec<[u8; DESCRIPTOR_BYTES]>) -> Self {
        Self {
            width: DESCRIPTOR_BYTES,
            data: rows.into_iter().flatten().collect(),
        }
    }
}

/// Hamming distance between two descriptors of equal width
pub fn descriptor_distance(a: &[u8], b: &[u8]) -> Result<u32, ConfigError> {
    if a.len() != b.len() {
        return Err(ConfigError::DescriptorWidthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(hamming(a, b))
}

/// Unchecked popcount of the XOR; callers guarantee equal widths.
#[inline]
pub(crate) fn hamming(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}
