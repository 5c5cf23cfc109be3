//! N-gram ingestion core for a sharded search index
//!
//! Documents are built one stream at a time. Each stream's terms pass
//! through a sliding window that emits every n-gram up to the configured
//! order, classified by inverse document frequency. Built documents are
//! handed to the [`Ingestor`], which places their postings into shards
//! and tracks their lifecycle while queries read the same shards.

pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod metrics;
pub mod term;
pub mod tokenizer;

pub use config::{IngestConfig, ShardConfig, TokenizerConfig};
pub use document::{Configuration, Document, DocumentCache, PostingSink};
pub use error::{Result, SluiceError};
pub use index::{
    DirectoryFileManager, DocId, DocumentLocation, FactHandle, FactSet, FileManager, GroupId,
    IngestStatistics, Ingestor, ShardId,
};
pub use metrics::IngestMetrics;
pub use term::{DocumentFrequencyTable, IdfX10, StreamId, Term};
pub use tokenizer::Tokenizer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
