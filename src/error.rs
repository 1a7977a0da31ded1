//! Error types shared by every pipeline stage.

use std::path::PathBuf;

/// Errors raised while reading, consolidating or writing track documents.
#[derive(Debug, thiserror::Error)]
pub enum TrackMergeError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML output error: {0}")]
    Write(#[from] std::io::Error),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Invalid KML: Document element not found")]
    MissingDocument,

    #[error("Invalid coordinates: {0:?}")]
    InvalidCoordinates(String),

    #[error("Invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid input pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("No valid KML input found")]
    NoUsableInput,
}

impl TrackMergeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackMergeError>;
