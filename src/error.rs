use thiserror::Error;

use crate::index::{DocId, FactHandle, GroupId};

/// Main error type for ingestion operations
#[derive(Error, Debug)]
pub enum SluiceError {
    #[error("Attempting to open a stream when another stream is open")]
    StreamAlreadyOpen,

    #[error("Attempting to add a term or close a stream with no open stream")]
    NoOpenStream,

    #[error("Document has too many streams (limit {limit})")]
    TooManyStreams { limit: usize },

    #[error("Duplicate document: {0}")]
    DuplicateDocument(DocId),

    #[error("Document not found: {0}")]
    UnknownDocument(DocId),

    #[error("Fact {0} is not registered")]
    UnknownFact(FactHandle),

    #[error("Too many facts: at most {limit} can be registered")]
    TooManyFacts { limit: usize },

    #[error("Group {0} is already open")]
    GroupAlreadyOpen(GroupId),

    #[error("Group {0} is open or was never closed")]
    GroupNotClosed(GroupId),

    #[error("Group {0} already exists")]
    DuplicateGroup(GroupId),

    #[error("No shard has capacity for a document with {expected_postings} postings")]
    CapacityExhausted { expected_postings: usize },

    #[error("Invalid document frequency for {term:?}: {value}")]
    InvalidFrequency { term: String, value: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ingestor has been shut down")]
    ShutDown,

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, SluiceError>;

impl SluiceError {
    /// Check if this error reports caller misuse rather than a resource or
    /// environment condition. Fatal errors are defects in the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SluiceError::CapacityExhausted { .. }
                | SluiceError::Serialization(_)
                | SluiceError::Json(_)
                | SluiceError::Io(_)
                | SluiceError::Metrics(_)
        )
    }
}
