//! # Pipeline Module
//!
//! Orchestrates indexing and matching.
//!
//! ## Pipeline Stages
//! 1. **Scan** - Discover card images in the specified directories
//! 2. **Extract** - Fingerprint each image and write it to the store
//! 3. **Match** - Cascade over every pair of stored records
//! 4. **Report** - Group, rank and count the results
//!
//! Stages 1-2 form the index phase and 3-4 the match phase. The store is
//! only written during indexing and only read during matching, so the two
//! phases need no locking beyond the barrier between them.
//!
//! ## Parallelism
//! Uses rayon for parallel extraction across images and parallel matching
//! across pairs.

mod executor;

pub use executor::{
    IndexSummary, Pipeline, PipelineBuilder, PipelineConfig, PipelineResult, SkippedImage,
};
