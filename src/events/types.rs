//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the deduplication pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Image discovery
    Scan(ScanEvent),
    /// Fingerprint extraction
    Extract(ExtractEvent),
    /// Pairwise matching
    Match(MatchEvent),
    /// Pipeline-level events
    Pipeline(PipelineEvent),
}

/// Events during image discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    Started { paths: Vec<PathBuf> },
    Progress(ScanProgress),
    /// An error occurred but scanning continues
    Error { path: PathBuf, message: String },
    Completed { total_images: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgress {
    pub directories_scanned: usize,
    pub images_found: usize,
    pub current_path: PathBuf,
}

/// Events during fingerprint extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtractEvent {
    Started { total_images: usize },
    Progress(ExtractProgress),
    /// The image could not be decoded; its identity is left out of the store
    Skipped { identity: String, message: String },
    Completed {
        processed: usize,
        failed: usize,
        already_stored: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractProgress {
    /// Images handled so far, successful or not
    pub completed: usize,
    pub total: usize,
    pub current_identity: String,
}

/// Events during the cascading match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MatchEvent {
    Started { total_records: usize, total_pairs: u64 },
    Progress(MatchProgress),
    /// A pair was dropped because its descriptors could not be compared
    PairSkipped {
        identity_a: String,
        identity_b: String,
        message: String,
    },
    Completed {
        pairs_evaluated: u64,
        fine_checks: u64,
        confirmed: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProgress {
    pub pairs_evaluated: u64,
    pub total_pairs: u64,
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    Started,
    PhaseChanged { phase: PipelinePhase },
    Completed { summary: PipelineSummary },
    /// Fatal error; nothing after this is valid
    Error { message: String },
}

/// Phases of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Scanning,
    Extracting,
    Matching,
    Reporting,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Scanning => write!(f, "Scanning"),
            PipelinePhase::Extracting => write!(f, "Extracting"),
            PipelinePhase::Matching => write!(f, "Matching"),
            PipelinePhase::Reporting => write!(f, "Reporting"),
        }
    }
}

/// Summary sent when a match run completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total_records: usize,
    pub pairs_evaluated: u64,
    pub fine_checks: u64,
    pub confirmed: usize,
    pub skipped_images: usize,
    pub skipped_pairs: u64,
    pub duration_ms: u64,
}
