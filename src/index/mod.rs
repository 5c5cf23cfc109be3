//! Sharded, concurrently queried ingestion index
//!
//! This module places built documents into shards and manages their
//! lifecycle while queries run against the same shards.
//!
//! # Architecture
//!
//! - `Ingestor`: coordinates add, delete, facts and group expiry
//! - `DocumentMap`: external id to row location, with tombstones
//! - `Shard`: fixed-size slices of rows plus per-term posting bitmaps
//! - `Recycler`: reclaims tombstoned rows once no reader can see them
//! - `GroupManager`: batches of documents expired together
//! - statistics: histogram and per-shard term tables for offline analysis

mod types;
mod document_map;
mod facts;
mod shard;
mod recycler;
mod group;
mod statistics;
mod ingestor;

pub use types::*;
pub use document_map::{DocumentEntry, DocumentMap, EntryState};
pub use facts::FactSet;
pub use shard::{DocumentHandle, Shard};
pub use recycler::{Recycler, Token, TokenManager};
pub use group::GroupManager;
pub use statistics::{
    write_shard_statistics, DirectoryFileManager, DocumentHistogramBuilder, FileManager,
    IndexedIdfTable,
};
pub use ingestor::{IngestStatistics, Ingestor, ShardStatistics};
