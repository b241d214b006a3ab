//! # CLI Module
//!
//! Command-line interface for the card artwork deduplicator.
//!
//! ## Usage
//! ```bash
//! # Fingerprint a collection into the default store
//! card-dedup index ~/cards
//!
//! # Only fingerprint cards the store has not seen
//! card-dedup index ~/cards --skip-existing
//!
//! # Match everything in the store, stricter coarse gate
//! card-dedup match --coarse-threshold 3 --format csv --output pairs.csv
//!
//! # Index and match in one go
//! card-dedup run ~/cards --config thresholds.json
//!
//! # What is in the store
//! card-dedup stats
//! ```

use card_dedup::core::config::MatchConfig;
use card_dedup::core::pipeline::{IndexSummary, Pipeline, PipelineBuilder, PipelineResult};
use card_dedup::core::reporter::ExportFormat;
use card_dedup::core::scanner::ScanConfig;
use card_dedup::core::store::{FingerprintStore, SqliteStore, StoreStats};
use card_dedup::error::{ReportError, Result};
use card_dedup::events::{
    Event, EventChannel, EventReceiver, ExtractEvent, MatchEvent, PipelineEvent, ScanEvent,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

/// Card Dedup - Find near-duplicate card artwork
#[derive(Parser, Debug)]
#[command(name = "card-dedup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Fingerprint store database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fingerprint images and write them to the store
    Index {
        #[command(flatten)]
        index: IndexArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Match every pair of stored fingerprints
    Match {
        #[command(flatten)]
        thresholds: ThresholdArgs,

        #[command(flatten)]
        report: ReportArgs,
    },
    /// Index then match
    Run {
        #[command(flatten)]
        index: IndexArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        #[command(flatten)]
        report: ReportArgs,
    },
    /// Show what the store holds
    Stats,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Directories to scan
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Leave images that are already stored untouched
    #[arg(long, conflicts_with = "rebuild")]
    skip_existing: bool,

    /// Empty the store before indexing
    #[arg(long)]
    rebuild: bool,

    /// Include hidden files
    #[arg(long)]
    include_hidden: bool,
}

#[derive(Args, Debug)]
struct ThresholdArgs {
    /// JSON file with threshold overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Max fingerprint distance kept in the report
    #[arg(long)]
    coarse_threshold: Option<u32>,

    /// Max fingerprint distance for descriptor matching
    #[arg(long)]
    fine_trigger: Option<u32>,

    /// Good descriptor matches needed to confirm a pair
    #[arg(long)]
    match_threshold: Option<u32>,

    /// Ratio test cutoff, between 0 and 1
    #[arg(long)]
    ratio_threshold: Option<f32>,

    /// Max descriptors per image
    #[arg(long)]
    descriptor_budget: Option<usize>,

    /// Global fingerprint width in bits
    #[arg(long)]
    fingerprint_bits: Option<u32>,
}

impl ThresholdArgs {
    /// File values first, then flags on top
    fn resolve(&self) -> Result<MatchConfig> {
        let mut config = match &self.config {
            Some(path) => MatchConfig::from_json_file(path)?,
            None => MatchConfig::default(),
        };

        if let Some(v) = self.coarse_threshold {
            config = config.coarse_threshold(v);
        }
        if let Some(v) = self.fine_trigger {
            config = config.fine_trigger(v);
        }
        if let Some(v) = self.match_threshold {
            config = config.match_threshold(v);
        }
        if let Some(v) = self.ratio_threshold {
            config = config.ratio_threshold(v);
        }
        if let Some(v) = self.descriptor_budget {
            config = config.descriptor_budget(v);
        }
        if let Some(v) = self.fingerprint_bits {
            config = config.fingerprint_bits(v);
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Report format
    #[arg(short, long, default_value = "text")]
    format: Format,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Human-readable report
    Text,
    /// Confirmed matches as CSV
    Csv,
    /// Whole report as JSON
    Json,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => ExportFormat::Text,
            Format::Csv => ExportFormat::Csv,
            Format::Json => ExportFormat::Json,
        }
    }
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    card_dedup::init_tracing(cli.verbose);

    let db = cli.db.unwrap_or_else(default_db_path);
    let term = Term::stderr();

    match cli.command {
        Commands::Index { index, thresholds } => {
            let config = thresholds.resolve()?;
            let pipeline = index_builder(&index, config, &db)?.build();
            let summary = with_progress(cli.verbose, |sender| pipeline.index_with_events(sender))?;
            print_index_summary(&term, &summary, &db);
            Ok(())
        }
        Commands::Match { thresholds, report } => {
            let config = thresholds.resolve()?;
            let pipeline = Pipeline::builder()
                .match_config(config)
                .store(Box::new(SqliteStore::open(&db)?))
                .build();
            let result =
                with_progress(cli.verbose, |sender| pipeline.find_matches_with_events(sender))?;
            print_match_summary(&term, &result);
            write_report(&result, &report)
        }
        Commands::Run {
            index,
            thresholds,
            report,
        } => {
            let config = thresholds.resolve()?;
            let pipeline = index_builder(&index, config, &db)?.build();
            let result = with_progress(cli.verbose, |sender| pipeline.run_with_events(sender))?;
            if let Some(summary) = &result.index {
                print_index_summary(&term, summary, &db);
            }
            print_match_summary(&term, &result);
            write_report(&result, &report)
        }
        Commands::Stats => {
            let store = SqliteStore::open(&db)?;
            let loaded = store.load_all()?;
            let stats = StoreStats::from_records(&loaded.records);
            print_stats(&term, &stats, &store);
            if !loaded.unreadable.is_empty() {
                term.write_line(&format!(
                    "  {} unreadable records (re-index with --rebuild)",
                    style(loaded.unreadable.len()).yellow()
                ))
                .ok();
            }
            Ok(())
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("card-dedup")
        .join("fingerprints.db")
}

fn index_builder(index: &IndexArgs, config: MatchConfig, db: &Path) -> Result<PipelineBuilder> {
    Ok(Pipeline::builder()
        .paths(index.paths.clone())
        .match_config(config)
        .scan_config(ScanConfig {
            include_hidden: index.include_hidden,
            ..ScanConfig::default()
        })
        .skip_existing(index.skip_existing)
        .rebuild(index.rebuild)
        .store(Box::new(SqliteStore::open(db)?)))
}

/// Run `work` with an event thread drawing a progress bar on stderr
fn with_progress<T>(
    verbose: bool,
    work: impl FnOnce(&card_dedup::events::EventSender) -> Result<T>,
) -> Result<T> {
    let (sender, receiver) = EventChannel::new();

    let progress = ProgressBar::new(0);
    if let Ok(progress_style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(progress_style.progress_chars("█▓░"));
    }

    let progress_clone = progress.clone();
    let event_thread = thread::spawn(move || render_events(receiver, &progress_clone, verbose));

    let result = work(&sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();
    progress.finish_and_clear();

    result
}

fn render_events(receiver: EventReceiver, progress: &ProgressBar, verbose: bool) {
    for event in receiver.iter() {
        match event {
            Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                progress.set_position(0);
                progress.set_message(format!("{}", phase));
            }
            Event::Scan(ScanEvent::Progress(p)) => {
                progress.set_message(format!("Scanning ({} images)", p.images_found));
            }
            Event::Extract(ExtractEvent::Started { total_images }) => {
                progress.set_length(total_images as u64);
            }
            Event::Extract(ExtractEvent::Progress(p)) => {
                progress.set_position(p.completed as u64);
                if verbose {
                    progress.set_message(p.current_identity);
                }
            }
            Event::Extract(ExtractEvent::Skipped { identity, message }) => {
                if verbose {
                    progress.println(format!("{} {}: {}", style("skip").yellow(), identity, message));
                }
            }
            Event::Match(MatchEvent::Started { total_pairs, .. }) => {
                progress.set_length(total_pairs);
            }
            Event::Match(MatchEvent::Progress(p)) => {
                progress.set_position(p.pairs_evaluated);
            }
            Event::Match(MatchEvent::PairSkipped {
                identity_a,
                identity_b,
                message,
            }) => {
                if verbose {
                    progress.println(format!(
                        "{} {} / {}: {}",
                        style("skip").yellow(),
                        identity_a,
                        identity_b,
                        message
                    ));
                }
            }
            Event::Pipeline(PipelineEvent::Completed { .. }) => {
                progress.finish_and_clear();
            }
            _ => {}
        }
    }
}

fn print_index_summary(term: &Term, summary: &IndexSummary, db: &Path) {
    term.write_line(&format!("{} Index Complete", style("✓").green().bold()))
        .ok();
    term.write_line(&format!(
        "  {} images fingerprinted in {:.1}s",
        style(summary.processed).cyan(),
        summary.duration_ms as f64 / 1000.0
    ))
    .ok();

    if summary.already_stored > 0 {
        term.write_line(&format!(
            "  {} already stored",
            style(summary.already_stored).dim()
        ))
        .ok();
    }

    if summary.failed() > 0 {
        term.write_line(&format!(
            "  {} images could not be read",
            style(summary.failed()).yellow()
        ))
        .ok();
    }

    for error in &summary.scan_errors {
        term.write_line(&format!("  {} {}", style("!").yellow(), error))
            .ok();
    }

    let size = SqliteStore::open(db)
        .map(|store| store.size_on_disk())
        .unwrap_or(0);
    term.write_line(&format!(
        "  {} records in {} ({})",
        style(summary.stored_records).cyan(),
        db.display(),
        format_bytes(size)
    ))
    .ok();
    term.write_line("").ok();
}

fn print_match_summary(term: &Term, result: &PipelineResult) {
    let summary = &result.report.summary;

    term.write_line(&format!("{} Match Complete", style("✓").green().bold()))
        .ok();
    term.write_line(&format!(
        "  {} pairs compared across {} records in {:.1}s",
        style(summary.pairs_evaluated).cyan(),
        summary.total_records,
        result.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!(
        "  {} fine checks performed",
        style(summary.fine_checks).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} confirmed matches",
        style(summary.confirmed).green().bold()
    ))
    .ok();

    if summary.skipped_pairs > 0 {
        term.write_line(&format!(
            "  {} pairs skipped",
            style(summary.skipped_pairs).yellow()
        ))
        .ok();
    }
    term.write_line("").ok();
}

fn print_stats(term: &Term, stats: &StoreStats, store: &SqliteStore) {
    term.write_line(&format!(
        "{} {}",
        style("Fingerprint store").bold().cyan(),
        style(store.path().display()).dim()
    ))
    .ok();
    term.write_line(&format!("  {} records", style(stats.total_records).cyan()))
        .ok();
    term.write_line(&format!(
        "  {} with descriptors ({:.1}%)",
        style(stats.with_descriptors).cyan(),
        stats.descriptor_coverage() * 100.0
    ))
    .ok();
    term.write_line(&format!(
        "  {} descriptors total",
        style(stats.total_descriptors).cyan()
    ))
    .ok();

    let widths: Vec<String> = stats
        .fingerprint_widths
        .iter()
        .map(|w| format!("{}-bit", w))
        .collect();
    if widths.len() > 1 {
        term.write_line(&format!(
            "  {} mixed fingerprint widths: {}",
            style("!").yellow(),
            widths.join(", ")
        ))
        .ok();
    } else if let Some(width) = widths.first() {
        term.write_line(&format!("  {} fingerprints", width)).ok();
    }

    term.write_line(&format!(
        "  {} on disk",
        style(format_bytes(store.size_on_disk())).yellow()
    ))
    .ok();
}

fn write_report(result: &PipelineResult, args: &ReportArgs) -> Result<()> {
    let format = ExportFormat::from(args.format);

    match &args.output {
        Some(path) => {
            let file = File::create(path).map_err(ReportError::Io)?;
            let mut writer = BufWriter::new(file);
            format.write(&result.report, &mut writer)?;
            writer.flush().map_err(ReportError::Io)?;
        }
        None => {
            let stdout = io::stdout();
            format.write(&result.report, stdout.lock())?;
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
