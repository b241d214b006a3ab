//! # card-dedup CLI
//!
//! Command-line interface for the card artwork deduplicator.
//!
//! ## Usage
//! ```bash
//! card-dedup run ~/cards --format csv --output pairs.csv
//! card-dedup index ~/cards --skip-existing
//! card-dedup match --coarse-threshold 8
//! ```

mod cli;

use card_dedup::Result;

fn main() -> Result<()> {
    cli::run()
}
