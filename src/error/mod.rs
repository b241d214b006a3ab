//! # Error Module
//!
//! Error types for the card artwork deduplicator.
//!
//! ## Propagation Policy
//! - **Per-image** problems (`DecodeError`) skip that image and are counted
//! - **Per-pair** descriptor problems skip that pair and are counted
//! - **Structural** problems (`ConfigError`) abort the run, since every
//!   later distance would be meaningless
//! - **Store** failures (`StoreError`) propagate to the caller untouched

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fingerprint store error: {0}")]
    Store(#[from] StoreError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Errors that occur while discovering image files
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Identity '{identity}' already taken by {first}; ignoring {duplicate}")]
    DuplicateIdentity {
        identity: String,
        first: PathBuf,
        duplicate: PathBuf,
    },
}

/// Errors that occur while decoding an image for fingerprinting
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to decode image {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Image is empty: {identity}")]
    EmptyImage { identity: String },

    #[error("Failed to open image file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invariant violations and invalid settings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Fingerprint widths differ: {left} bits vs {right} bits")]
    FingerprintWidthMismatch { left: u32, right: u32 },

    #[error("Descriptor widths differ: {left} bytes vs {right} bytes")]
    DescriptorWidthMismatch { left: usize, right: usize },

    #[error("Invalid fingerprint width: {bits} bits (must be a power of two, 8-1024)")]
    InvalidFingerprintBits { bits: u32 },

    #[error("Invalid fingerprint hex '{value}': {reason}")]
    InvalidFingerprintHex { value: String, reason: String },

    #[error("Descriptor blob of {len} bytes is not a multiple of width {width}")]
    MalformedDescriptorBlob { len: usize, width: usize },

    #[error("Invalid {name}: {value}")]
    InvalidThreshold { name: &'static str, value: String },

    #[error("Failed to load configuration from {path}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },
}

/// Errors raised by a fingerprint store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open fingerprint store at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Store query failed: {0}")]
    QueryFailed(String),

    #[error("Fingerprint store at {path} is unusable. Delete this file and re-index.")]
    Corrupted { path: PathBuf },

    #[error("Stored record for '{identity}' is invalid: {reason}")]
    InvalidRecord { identity: String, reason: String },
}

/// Errors that occur while writing a report
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, DedupError>;
