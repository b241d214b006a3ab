//! # Scanner Module
//!
//! Discovers card images in directories and names each one.
//!
//! The identity of an image is its file stem (`mox-emerald.webp` becomes
//! `mox-emerald`), so renaming a file renames the record. Files are visited
//! in sorted path order; when two files share a stem the first one wins and
//! the other is reported as a non-fatal error.
//!
//! ## Supported Formats
//! - WebP (.webp)
//! - PNG (.png)
//! - JPEG (.jpg, .jpeg)
//! - BMP, GIF, TIFF
//!
//! ## Example
//! ```rust,ignore
//! use card_dedup::core::scanner::{ImageScanner, ScanConfig, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(ScanConfig::default());
//! let result = scanner.scan(&["/srv/cards".into()])?;
//! ```

mod filter;
mod walker;

pub use filter::ImageFilter;
pub use walker::{ScanConfig, WalkDirScanner};

use crate::core::fingerprint::ImageIdentity;
use crate::error::ScanError;
use crate::events::EventSender;
use std::path::{Path, PathBuf};

/// A discovered image and the identity it will be stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub identity: ImageIdentity,
    pub path: PathBuf,
}

impl ImageSource {
    /// Name a file by its stem; `None` for paths without one
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        Some(Self {
            identity: ImageIdentity::from(stem),
            path: path.to_path_buf(),
        })
    }
}

/// Result of a scan operation
#[derive(Debug)]
pub struct ScanResult {
    /// Discovered images, sorted by identity
    pub images: Vec<ImageSource>,
    /// Errors that occurred during scanning (non-fatal)
    pub errors: Vec<ScanError>,
}

/// Trait for image scanners
///
/// Implement this trait to feed images from somewhere other than the
/// filesystem (e.g., in tests).
pub trait ImageScanner: Send + Sync {
    /// Scan directories and return discovered images
    fn scan(&self, paths: &[PathBuf]) -> Result<ScanResult, ScanError>;

    /// Scan with progress reporting via events
    fn scan_with_events(
        &self,
        paths: &[PathBuf],
        events: &EventSender,
    ) -> Result<ScanResult, ScanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_file_stem() {
        let source = ImageSource::from_path(Path::new("/cards/set-a/black-lotus.webp")).unwrap();
        assert_eq!(source.identity.as_str(), "black-lotus");
        assert_eq!(source.path, PathBuf::from("/cards/set-a/black-lotus.webp"));
    }

    #[test]
    fn only_last_extension_is_stripped() {
        let source = ImageSource::from_path(Path::new("card.v2.png")).unwrap();
        assert_eq!(source.identity.as_str(), "card.v2");
    }

    #[test]
    fn root_path_has_no_identity() {
        assert!(ImageSource::from_path(Path::new("/")).is_none());
    }
}
