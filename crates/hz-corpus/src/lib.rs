//! hz-corpus: Corpus scanning and velocity distribution database
//!
//! Decodes many MIDI files in parallel under a fixed concurrency bound and
//! folds their note events into a set-valued database keyed by note, message
//! type and quarter position.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hz_corpus::{scan_inputs, CancelToken, DatabaseLayout, PathList, ScanConfig};
//!
//! let config = ScanConfig::default().with_concurrency(4);
//! let output = scan_inputs(PathList::open("corpus.txt")?, &config, CancelToken::new())?;
//! output.database.save("velocities.json", DatabaseLayout::Positioned)?;
//! ```

mod aggregate;
mod cancel;
mod config;
mod database;
mod error;
mod list;
mod pool;

pub use aggregate::*;
pub use cancel::*;
pub use config::*;
pub use database::*;
pub use error::*;
pub use list::*;
pub use pool::*;
