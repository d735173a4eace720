//! Error types for MIDI decoding

use std::fmt;

use thiserror::Error;

/// Four-byte chunk identifier (`MThd`, `MTrk`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(pub [u8; 4]);

impl ChunkId {
    pub const HEADER: ChunkId = ChunkId(*b"MThd");
    pub const TRACK: ChunkId = ChunkId(*b"MTrk");
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02X}", b)?;
            }
        }
        Ok(())
    }
}

/// MIDI decoding errors
#[derive(Error, Debug)]
pub enum MidiError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unexpected data: expected chunk {expected}, found {found} at offset {offset}")]
    UnexpectedData {
        expected: ChunkId,
        found: ChunkId,
        offset: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MidiError {
    /// True when the error is the end-of-stream sentinel rather than a real failure.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, MidiError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

/// Result type for MIDI decoding
pub type MidiResult<T> = Result<T, MidiError>;
