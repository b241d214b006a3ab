//! # Card Dedup
//!
//! Finds near-duplicate card artwork in large image collections.
//!
//! ## How It Works
//! - **Fingerprint** each image once: a perceptual hash for the whole image
//!   and a small set of local binary descriptors
//! - **Store** the fingerprints so matching can be re-run without decoding
//! - **Cascade** over every pair: the cheap hash distance prunes, the
//!   expensive descriptor matching confirms
//! - **Report** pairs grouped by distance, with confirmed matches ranked
//!
//! ## Architecture
//! - `core` - The fingerprinting and matching engine
//! - `events` - Event-driven progress reporting
//! - `error` - Error types and propagation policy
//! - `cli` - Command-line interface (binary only)

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{DedupError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point. `verbose` raises
/// the default level to debug when `RUST_LOG` is unset. Calling it twice is
/// harmless.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
