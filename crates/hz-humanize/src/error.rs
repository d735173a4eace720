//! Error types for velocity resynthesis

use hz_corpus::CorpusError;
use hz_midi::MidiError;
use thiserror::Error;

/// Humanization errors
#[derive(Error, Debug)]
pub enum HumanizeError {
    #[error("MIDI error: {0}")]
    Midi(#[from] MidiError),

    #[error("Database error: {0}")]
    Database(#[from] CorpusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty velocity window ({min}, {max})")]
    InvalidWindow { min: u8, max: u8 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for humanization
pub type HumanizeResult<T> = Result<T, HumanizeError>;
