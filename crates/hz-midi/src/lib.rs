//! hz-midi: Standard MIDI File decoding for velocity humanization
//!
//! Decodes header and track chunks into per-track note events. Each event
//! records the absolute byte offset of its velocity, so a file can be
//! patched in place without re-encoding.
//!
//! ```text
//! MThd ─► division ─► MTrk ─► [delta | status | data...]* ─► MTrk ─► ...
//!                                        │
//!                       Event { note, velocity, velocity_offset, tick }
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hz_midi::decode_file;
//!
//! let file = decode_file("song.mid")?;
//! for event in file.events() {
//!     let pos = event.quarter_position(file.ticks_per_quarter_note);
//!     println!("{} {} @{} q{}", event.note, event.velocity, event.velocity_offset, pos);
//! }
//! ```

mod decoder;
mod error;
mod event;
mod quarter;
mod reader;

pub use decoder::*;
pub use error::*;
pub use event::*;
pub use quarter::*;
pub use reader::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
