//! Pipeline execution implementation.

use crate::core::config::MatchConfig;
use crate::core::fingerprint::{ExtractorConfig, FingerprintExtractor, FingerprintRecord};
use crate::core::matcher::CascadeMatcher;
use crate::core::reporter::{ReportAggregator, SimilarityReport};
use crate::core::scanner::{ImageScanner, ImageSource, ScanConfig, WalkDirScanner};
use crate::core::store::{FingerprintStore, InMemoryStore};
use crate::error::DedupError;
use crate::events::{
    null_sender, Event, EventSender, ExtractEvent, ExtractProgress, MatchEvent, PipelineEvent,
    PipelinePhase, PipelineSummary,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Records extracted before each store write
const DEFAULT_BATCH_SIZE: usize = 256;

/// An image that produced no record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedImage {
    pub identity: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Result of the index phase
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Images found by the scanner
    pub discovered: usize,
    /// Images fingerprinted and written to the store
    pub processed: usize,
    /// Images left untouched because the store already had them
    pub already_stored: usize,
    /// Images that could not be decoded
    pub skipped: Vec<SkippedImage>,
    /// Non-fatal scanner problems
    pub scan_errors: Vec<String>,
    /// Records in the store after indexing
    pub stored_records: usize,
    pub duration_ms: u64,
}

impl IndexSummary {
    pub fn failed(&self) -> usize {
        self.skipped.len()
    }
}

/// Result of a full run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Present when the run indexed before matching
    pub index: Option<IndexSummary>,
    pub report: SimilarityReport,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Configuration for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directories to scan
    pub paths: Vec<PathBuf>,
    pub match_config: MatchConfig,
    pub extractor_config: ExtractorConfig,
    pub scan_config: ScanConfig,
    /// Leave identities that are already stored untouched
    pub skip_existing: bool,
    /// Empty the store before indexing
    pub rebuild: bool,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            match_config: MatchConfig::default(),
            extractor_config: ExtractorConfig::default(),
            scan_config: ScanConfig::default(),
            skip_existing: false,
            rebuild: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Builder for pipeline configuration
pub struct PipelineBuilder {
    config: PipelineConfig,
    store: Option<Box<dyn FingerprintStore>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            store: None,
        }
    }

    /// Add directories to scan
    pub fn paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.config.paths = paths;
        self
    }

    pub fn match_config(mut self, config: MatchConfig) -> Self {
        self.config.match_config = config;
        self
    }

    pub fn extractor_config(mut self, config: ExtractorConfig) -> Self {
        self.config.extractor_config = config;
        self
    }

    pub fn scan_config(mut self, config: ScanConfig) -> Self {
        self.config.scan_config = config;
        self
    }

    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.config.skip_existing = skip;
        self
    }

    pub fn rebuild(mut self, rebuild: bool) -> Self {
        self.config.rebuild = rebuild;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size.max(1);
        self
    }

    /// Set the store backend (in-memory when unset)
    pub fn store(mut self, store: Box<dyn FingerprintStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            config: self.config,
            store: self.store.unwrap_or_else(|| Box::new(InMemoryStore::new())),
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The deduplication pipeline
pub struct Pipeline {
    config: PipelineConfig,
    store: Box<dyn FingerprintStore>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn FingerprintStore {
        self.store.as_ref()
    }

    /// Index then match, without events
    pub fn run(&self) -> Result<PipelineResult, DedupError> {
        self.run_with_events(&null_sender())
    }

    /// Index then match
    pub fn run_with_events(&self, events: &EventSender) -> Result<PipelineResult, DedupError> {
        let start_time = Instant::now();
        events.send(Event::Pipeline(PipelineEvent::Started));

        let outcome = self
            .index_phase(events)
            .and_then(|index| {
                let report = self.match_phase(index.failed(), events)?;
                Ok((index, report))
            });

        match outcome {
            Ok((index, report)) => {
                let duration_ms = start_time.elapsed().as_millis() as u64;
                events.send(completed_event(&report, duration_ms));
                Ok(PipelineResult {
                    index: Some(index),
                    report,
                    duration_ms,
                })
            }
            Err(e) => {
                events.send(Event::Pipeline(PipelineEvent::Error {
                    message: e.to_string(),
                }));
                Err(e)
            }
        }
    }

    /// Scan, fingerprint and store
    pub fn index(&self) -> Result<IndexSummary, DedupError> {
        self.index_with_events(&null_sender())
    }

    pub fn index_with_events(&self, events: &EventSender) -> Result<IndexSummary, DedupError> {
        events.send(Event::Pipeline(PipelineEvent::Started));
        self.index_phase(events).inspect_err(|e| {
            events.send(Event::Pipeline(PipelineEvent::Error {
                message: e.to_string(),
            }));
        })
    }

    /// Match everything currently in the store
    pub fn find_matches(&self) -> Result<PipelineResult, DedupError> {
        self.find_matches_with_events(&null_sender())
    }

    pub fn find_matches_with_events(
        &self,
        events: &EventSender,
    ) -> Result<PipelineResult, DedupError> {
        let start_time = Instant::now();
        events.send(Event::Pipeline(PipelineEvent::Started));

        match self.match_phase(0, events) {
            Ok(report) => {
                let duration_ms = start_time.elapsed().as_millis() as u64;
                events.send(completed_event(&report, duration_ms));
                Ok(PipelineResult {
                    index: None,
                    report,
                    duration_ms,
                })
            }
            Err(e) => {
                events.send(Event::Pipeline(PipelineEvent::Error {
                    message: e.to_string(),
                }));
                Err(e)
            }
        }
    }

    fn index_phase(&self, events: &EventSender) -> Result<IndexSummary, DedupError> {
        let start_time = Instant::now();
        let extractor = FingerprintExtractor::with_extractor_config(
            &self.config.match_config,
            self.config.extractor_config,
        )?;

        // Phase 1: Scanning
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Scanning,
        }));

        let scanner = WalkDirScanner::new(self.config.scan_config.clone());
        let scan_result = scanner.scan_with_events(&self.config.paths, events)?;

        let mut summary = IndexSummary {
            discovered: scan_result.images.len(),
            scan_errors: scan_result.errors.iter().map(|e| e.to_string()).collect(),
            ..IndexSummary::default()
        };

        if self.config.rebuild {
            tracing::info!("Clearing fingerprint store before indexing");
            self.store.clear()?;
        }

        let mut pending = Vec::with_capacity(scan_result.images.len());
        for source in scan_result.images {
            if self.config.skip_existing && self.store.get(&source.identity)?.is_some() {
                summary.already_stored += 1;
            } else {
                pending.push(source);
            }
        }

        // Phase 2: Extracting
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Extracting,
        }));
        events.send(Event::Extract(ExtractEvent::Started {
            total_images: pending.len(),
        }));

        let total = pending.len();
        let completed = AtomicUsize::new(0);

        for chunk in pending.chunks(self.config.batch_size) {
            let outcomes: Vec<Result<FingerprintRecord, SkippedImage>> = chunk
                .par_iter()
                .map(|source| {
                    let outcome = extract_one(&extractor, source, events);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    events.send(Event::Extract(ExtractEvent::Progress(ExtractProgress {
                        completed: done,
                        total,
                        current_identity: source.identity.to_string(),
                    })));
                    outcome
                })
                .collect();

            let mut batch = Vec::with_capacity(outcomes.len());
            for outcome in outcomes {
                match outcome {
                    Ok(record) => batch.push(record),
                    Err(skipped) => summary.skipped.push(skipped),
                }
            }

            summary.processed += batch.len();
            self.store.put_batch(&batch)?;
        }

        summary.stored_records = self.store.count()?;
        summary.duration_ms = start_time.elapsed().as_millis() as u64;

        events.send(Event::Extract(ExtractEvent::Completed {
            processed: summary.processed,
            failed: summary.failed(),
            already_stored: summary.already_stored,
        }));

        tracing::info!(
            "Indexed {} images ({} failed, {} already stored, {} records in store)",
            summary.processed,
            summary.failed(),
            summary.already_stored,
            summary.stored_records
        );

        Ok(summary)
    }

    fn match_phase(
        &self,
        skipped_images: usize,
        events: &EventSender,
    ) -> Result<SimilarityReport, DedupError> {
        // Phase 3: Matching
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Matching,
        }));

        let matcher = CascadeMatcher::new(self.config.match_config.clone())?;
        // Rows that no longer decode count as skipped images, like files
        // that failed to decode during indexing
        let loaded = self.store.load_all()?;
        let skipped_images = skipped_images + loaded.unreadable.len();

        let aggregator = ReportAggregator::with_retention(self.config.match_config.coarse_threshold);
        let aggregator = matcher.run_into(&loaded.records, aggregator, events)?;

        // Phase 4: Reporting
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Reporting,
        }));

        let report = aggregator.finish(skipped_images);

        events.send(Event::Match(MatchEvent::Completed {
            pairs_evaluated: report.summary.pairs_evaluated,
            fine_checks: report.summary.fine_checks,
            confirmed: report.summary.confirmed,
        }));

        Ok(report)
    }
}

fn extract_one(
    extractor: &FingerprintExtractor,
    source: &ImageSource,
    events: &EventSender,
) -> Result<FingerprintRecord, SkippedImage> {
    extractor
        .extract_file(source.identity.clone(), &source.path)
        .map_err(|e| {
            tracing::warn!("Skipping {}: {}", source.identity, e);
            events.send(Event::Extract(ExtractEvent::Skipped {
                identity: source.identity.to_string(),
                message: e.to_string(),
            }));
            SkippedImage {
                identity: source.identity.to_string(),
                path: source.path.clone(),
                reason: e.to_string(),
            }
        })
}

fn completed_event(report: &SimilarityReport, duration_ms: u64) -> Event {
    let summary = &report.summary;
    Event::Pipeline(PipelineEvent::Completed {
        summary: PipelineSummary {
            total_records: summary.total_records,
            pairs_evaluated: summary.pairs_evaluated,
            fine_checks: summary.fine_checks,
            confirmed: summary.confirmed,
            skipped_images: summary.skipped_images,
            skipped_pairs: summary.skipped_pairs,
            duration_ms,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::fs;
    use tempfile::TempDir;

    fn write_blocks(dir: &TempDir, name: &str, seed: u64) -> PathBuf {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let levels: Vec<u8> = (0..20 * 20).map(|_| rng.gen()).collect();
        let image = ImageBuffer::from_fn(160, 160, |x, y| {
            let level = levels[((y / 8) * 20 + x / 8) as usize];
            Luma([level.wrapping_add((x / 8 * 37 + y / 8 * 11) as u8)])
        });
        let path = dir.path().join(name);
        image.save(&path).unwrap();
        path
    }

    #[test]
    fn pipeline_builder_creates_pipeline() {
        let pipeline = Pipeline::builder()
            .paths(vec![PathBuf::from("/cards")])
            .match_config(MatchConfig::new().coarse_threshold(8).fine_trigger(8))
            .skip_existing(true)
            .batch_size(0)
            .build();

        assert_eq!(pipeline.config().match_config.coarse_threshold, 8);
        assert!(pipeline.config().skip_existing);
        assert_eq!(pipeline.config().batch_size, 1);
    }

    #[test]
    fn pipeline_handles_empty_directory() {
        let temp_dir = TempDir::new().unwrap();

        let pipeline = Pipeline::builder()
            .paths(vec![temp_dir.path().to_path_buf()])
            .build();

        let result = pipeline.run().unwrap();

        assert_eq!(result.index.unwrap().discovered, 0);
        assert_eq!(result.report.summary.total_records, 0);
        assert!(result.report.buckets.is_empty());
    }

    #[test]
    fn corrupt_image_is_skipped_and_counted() {
        let temp_dir = TempDir::new().unwrap();
        write_blocks(&temp_dir, "good-a.png", 1);
        write_blocks(&temp_dir, "good-b.png", 2);
        fs::write(temp_dir.path().join("broken.png"), b"not a png").unwrap();

        let pipeline = Pipeline::builder()
            .paths(vec![temp_dir.path().to_path_buf()])
            .build();
        let result = pipeline.run().unwrap();

        let index = result.index.unwrap();
        assert_eq!(index.discovered, 3);
        assert_eq!(index.processed, 2);
        assert_eq!(index.failed(), 1);
        assert_eq!(index.skipped[0].identity, "broken");
        assert_eq!(result.report.summary.skipped_images, 1);
        assert_eq!(result.report.summary.pairs_evaluated, 1);
    }

    #[test]
    fn skip_existing_leaves_stored_records_alone() {
        let temp_dir = TempDir::new().unwrap();
        write_blocks(&temp_dir, "card.png", 7);

        let pipeline = Pipeline::builder()
            .paths(vec![temp_dir.path().to_path_buf()])
            .skip_existing(true)
            .build();

        let first = pipeline.index().unwrap();
        assert_eq!(first.processed, 1);

        let second = pipeline.index().unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.already_stored, 1);
        assert_eq!(second.stored_records, 1);
    }

    #[test]
    fn rebuild_drops_records_for_missing_images() {
        let temp_dir = TempDir::new().unwrap();
        let gone = write_blocks(&temp_dir, "gone.png", 3);
        write_blocks(&temp_dir, "kept.png", 4);

        let pipeline = Pipeline::builder()
            .paths(vec![temp_dir.path().to_path_buf()])
            .rebuild(true)
            .build();

        assert_eq!(pipeline.index().unwrap().stored_records, 2);
        fs::remove_file(gone).unwrap();
        assert_eq!(pipeline.index().unwrap().stored_records, 1);
    }

    #[test]
    fn invalid_config_fails_before_scanning() {
        let pipeline = Pipeline::builder()
            .paths(vec![PathBuf::from("/definitely/not/here")])
            .match_config(MatchConfig::new().ratio_threshold(1.5))
            .build();

        assert!(matches!(pipeline.run(), Err(DedupError::Config(_))));
    }

    #[test]
    fn events_cover_every_phase() {
        let temp_dir = TempDir::new().unwrap();
        write_blocks(&temp_dir, "a.png", 11);
        write_blocks(&temp_dir, "b.png", 12);

        let pipeline = Pipeline::builder()
            .paths(vec![temp_dir.path().to_path_buf()])
            .build();

        let (sender, receiver) = crate::events::EventChannel::new();
        pipeline.run_with_events(&sender).unwrap();
        drop(sender);

        let phases: Vec<PipelinePhase> = receiver
            .iter()
            .filter_map(|e| match e {
                Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => Some(phase),
                _ => None,
            })
            .collect();

        assert_eq!(
            phases,
            vec![
                PipelinePhase::Scanning,
                PipelinePhase::Extracting,
                PipelinePhase::Matching,
                PipelinePhase::Reporting,
            ]
        );
    }
}
