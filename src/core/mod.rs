//! # Core Module
//!
//! The fingerprinting and matching engine.
//!
//! ## Modules
//! - `config` - Thresholds shared by every stage
//! - `scanner` - Discovers card images in directories
//! - `fingerprint` - Computes global and local fingerprints
//! - `store` - Persists fingerprint records
//! - `pairs` - Enumerates unordered record pairs
//! - `matcher` - Coarse-then-fine cascade over each pair
//! - `reporter` - Groups, ranks and exports results
//! - `pipeline` - Orchestrates the full workflow

pub mod config;
pub mod fingerprint;
pub mod matcher;
pub mod pairs;
pub mod pipeline;
pub mod reporter;
pub mod scanner;
pub mod store;

// Re-export commonly used types
pub use config::MatchConfig;
pub use fingerprint::{FingerprintExtractor, FingerprintRecord, ImageIdentity};
pub use matcher::{CascadeMatcher, MatchResult};
pub use reporter::{ReportAggregator, SimilarityReport};
pub use store::FingerprintStore;
