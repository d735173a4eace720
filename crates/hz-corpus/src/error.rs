//! Error types for corpus scanning

use std::path::PathBuf;

use hz_midi::MidiError;
use thiserror::Error;

/// Corpus scanning errors
#[derive(Error, Debug)]
pub enum CorpusError {
    /// One file of the corpus failed to decode; the whole scan is abandoned.
    #[error("Failed to decode {}: {source}", path.display())]
    Item {
        path: PathBuf,
        #[source]
        source: MidiError,
    },

    #[error("Failed to read path list at line {line}: {source}")]
    PathList {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Scan cancelled after {processed} files")]
    Cancelled { processed: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Database schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Failed to start worker thread: {0}")]
    ThreadSpawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for corpus operations
pub type CorpusResult<T> = Result<T, CorpusError>;
