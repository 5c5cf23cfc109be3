//! Ingestion statistics and the sinks they are written to
//!
//! Per ingestor: the document histogram. Per shard: cumulative term
//! counts, the document frequency table, and the indexed IDF table.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::term::IdfX10;

use super::shard::Shard;
use super::types::ShardId;

/// Histogram of documents by posting count
#[derive(Debug, Default)]
pub struct DocumentHistogramBuilder {
    buckets: Mutex<BTreeMap<usize, u64>>,
}

impl DocumentHistogramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&self, posting_count: usize) {
        *self.buckets.lock().entry(posting_count).or_insert(0) += 1;
    }

    pub fn buckets(&self) -> Vec<(usize, u64)> {
        self.buckets
            .lock()
            .iter()
            .map(|(postings, count)| (*postings, *count))
            .collect()
    }

    /// Write `postings,documents` lines in ascending posting order
    pub fn write<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "postings,documents")?;
        for (postings, count) in self.buckets() {
            writeln!(out, "{},{}", postings, count)?;
        }
        Ok(())
    }
}

/// Where statistics files go
pub trait FileManager {
    fn document_histogram(&self) -> io::Result<Box<dyn Write>>;
    fn cumulative_term_counts(&self, shard: ShardId) -> io::Result<Box<dyn Write>>;
    fn document_frequency_table(&self, shard: ShardId) -> io::Result<Box<dyn Write>>;
    fn indexed_idf_table(&self, shard: ShardId) -> io::Result<Box<dyn Write>>;
}

/// Writes every statistics file into one directory
#[derive(Clone, Debug)]
pub struct DirectoryFileManager {
    dir: PathBuf,
}

impl DirectoryFileManager {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document_histogram_path(&self) -> PathBuf {
        self.dir.join("DocumentHistogram.csv")
    }

    pub fn cumulative_term_counts_path(&self, shard: ShardId) -> PathBuf {
        self.dir.join(format!("CumulativeTermCounts-{}.csv", shard.0))
    }

    pub fn document_frequency_table_path(&self, shard: ShardId) -> PathBuf {
        self.dir.join(format!("DocFreqTable-{}.csv", shard.0))
    }

    pub fn indexed_idf_table_path(&self, shard: ShardId) -> PathBuf {
        self.dir.join(format!("IndexedIdfTable-{}.bin", shard.0))
    }

    fn create(path: PathBuf) -> io::Result<Box<dyn Write>> {
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }
}

impl FileManager for DirectoryFileManager {
    fn document_histogram(&self) -> io::Result<Box<dyn Write>> {
        Self::create(self.document_histogram_path())
    }

    fn cumulative_term_counts(&self, shard: ShardId) -> io::Result<Box<dyn Write>> {
        Self::create(self.cumulative_term_counts_path(shard))
    }

    fn document_frequency_table(&self, shard: ShardId) -> io::Result<Box<dyn Write>> {
        Self::create(self.document_frequency_table_path(shard))
    }

    fn indexed_idf_table(&self, shard: ShardId) -> io::Result<Box<dyn Write>> {
        Self::create(self.indexed_idf_table_path(shard))
    }
}

/// Serialized form of a shard's indexed IDF table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedIdfTable {
    pub shard: ShardId,
    /// `(raw_hash, idf)` sorted by hash
    pub entries: Vec<(u64, IdfX10)>,
}

impl IndexedIdfTable {
    pub fn lookup(&self, raw_hash: u64) -> Option<IdfX10> {
        self.entries
            .binary_search_by_key(&raw_hash, |(hash, _)| *hash)
            .ok()
            .map(|i| self.entries[i].1)
    }

    pub fn read_from<R: io::Read>(reader: R) -> Result<Self> {
        Ok(bincode::deserialize_from(reader)?)
    }
}

/// Write the three per-shard statistics files
///
/// Document frequency lines are `text,df` when `term_to_text` is set and
/// `raw_hash,df` (hash in hex) otherwise.
pub fn write_shard_statistics(
    shard: &Shard,
    files: &dyn FileManager,
    term_to_text: bool,
) -> Result<()> {
    let mut out = files.cumulative_term_counts(shard.id())?;
    for (documents, terms) in shard.cumulative_term_counts().iter().enumerate() {
        writeln!(out, "{},{}", documents + 1, terms)?;
    }
    out.flush()?;

    let mut out = files.document_frequency_table(shard.id())?;
    for (term, df) in shard.document_frequencies() {
        if term_to_text {
            writeln!(out, "{},{}", term.text(), df)?;
        } else {
            writeln!(out, "{:016x},{}", term.raw_hash(), df)?;
        }
    }
    out.flush()?;

    let table = IndexedIdfTable {
        shard: shard.id(),
        entries: shard.indexed_idf_table(),
    };
    let mut out = files.indexed_idf_table(shard.id())?;
    bincode::serialize_into(&mut out, &table)?;
    out.flush()?;
    Ok(())
}
