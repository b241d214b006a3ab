//! # Events Module
//!
//! Progress reporting through a caller-supplied channel.
//!
//! The engine never keeps ambient counters: each phase sends its progress
//! through the `EventSender` it was handed, and whoever holds the receiver
//! (the CLI progress bar, a test, nothing at all) decides what to do with it.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Match(MatchEvent::Progress(p)) = event {
//!             println!("{}/{} pairs", p.pairs_evaluated, p.total_pairs);
//!         }
//!     }
//! });
//!
//! pipeline.run_with_events(&sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
