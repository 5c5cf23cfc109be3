//! Document lifecycle coordination: add, delete, facts, groups
//!
//! Adds of distinct documents run in parallel. Deletes and group expiry
//! are serialized by one lock so the tombstone-then-decrement sequence of
//! one delete never interleaves with another. Readers never take that
//! lock.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::document::{Configuration, Document, DocumentCache};
use crate::error::{Result, SluiceError};
use crate::metrics::IngestMetrics;
use crate::term::DocumentFrequencyTable;

use super::document_map::DocumentMap;
use super::facts::FactSet;
use super::group::GroupManager;
use super::recycler::{Recycler, Token, TokenManager};
use super::shard::{DocumentHandle, Shard};
use super::statistics::{write_shard_statistics, DocumentHistogramBuilder, FileManager};
use super::types::{DocId, DocumentLocation, FactHandle, GroupId, ShardId};

/// Point-in-time summary of the ingestor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestStatistics {
    pub document_count: usize,
    pub total_source_bytes: usize,
    pub posting_count: usize,
    pub used_capacity_bytes: usize,
    pub pending_reclaims: usize,
    pub shards: Vec<ShardStatistics>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardStatistics {
    pub shard: ShardId,
    pub documents: usize,
    pub slices: usize,
    pub terms: usize,
}

pub struct Ingestor {
    configuration: Configuration,
    facts: Arc<FactSet>,
    document_map: Arc<DocumentMap>,
    shards: Vec<Arc<Shard>>,
    document_cache: DocumentCache,
    histogram: DocumentHistogramBuilder,
    groups: GroupManager,
    tokens: Arc<TokenManager>,
    recycler: Recycler,
    metrics: IngestMetrics,

    // Serializes deletes and group expiry
    delete_lock: Mutex<()>,

    document_count: AtomicUsize,
    total_source_byte_size: AtomicUsize,
    posting_count: AtomicUsize,
    shut_down: AtomicBool,
}

impl Ingestor {
    pub fn new(
        config: IngestConfig,
        frequencies: Arc<DocumentFrequencyTable>,
        facts: Arc<FactSet>,
    ) -> Result<Self> {
        config.validate()?;
        let configuration = Configuration::from_config(&config, frequencies)?;

        let shards: Vec<Arc<Shard>> = config
            .shards
            .iter()
            .enumerate()
            .map(|(i, shard_config)| {
                let max_postings = config.shards.get(i + 1).map(|next| next.min_postings);
                Arc::new(Shard::new(ShardId(i as u16), shard_config, max_postings))
            })
            .collect();

        let document_map = Arc::new(DocumentMap::new());
        let tokens = TokenManager::new();
        let recycler = Recycler::spawn(tokens.clone(), document_map.clone());

        info!(
            shards = shards.len(),
            max_gram_size = config.max_gram_size,
            "ingestor started"
        );

        Ok(Self {
            configuration,
            facts,
            document_map,
            shards,
            document_cache: DocumentCache::new(config.document_cache_capacity),
            histogram: DocumentHistogramBuilder::new(),
            groups: GroupManager::new(),
            tokens,
            recycler,
            metrics: IngestMetrics::new()?,
            delete_lock: Mutex::new(()),
            document_count: AtomicUsize::new(0),
            total_source_byte_size: AtomicUsize::new(0),
            posting_count: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Settings new documents for this index are built with
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn new_document(&self) -> Document {
        Document::new(&self.configuration)
    }

    /// Add a fully built document
    ///
    /// Fails with `DuplicateDocument` if `id` is live and with
    /// `CapacityExhausted` if no shard has a free row. The document
    /// becomes visible only after its postings are all placed.
    pub fn add(&self, id: DocId, document: Arc<Document>) -> Result<()> {
        let start = Instant::now();
        self.ensure_running()?;

        if self.contains(id) {
            self.metrics.record_add_failure("duplicate");
            return Err(SluiceError::DuplicateDocument(id));
        }

        let expected_postings = document.posting_count();
        let mut handle = self.request_write_handle(expected_postings)?;
        if let Err(e) = document.ingest(&mut handle) {
            handle.abandon();
            return Err(e);
        }

        // Claim the id before the row is published so a racing add of the
        // same id never makes a second row visible.
        let location = handle.location();
        if let Err(e) = self.document_map.reserve(id, location) {
            handle.abandon();
            self.metrics.record_add_failure("duplicate");
            return Err(e);
        }
        let postings = handle.posting_count();
        handle.commit(id);

        // Counted before the entry goes live so a racing delete never
        // decrements below zero.
        self.document_count.fetch_add(1, Ordering::SeqCst);
        self.document_map.publish(id, location);

        self.total_source_byte_size
            .fetch_add(document.source_byte_size(), Ordering::SeqCst);
        self.posting_count.fetch_add(postings, Ordering::SeqCst);
        let group = self.groups.record(id);
        self.histogram.add_document(postings);
        self.document_cache.insert(id, document);

        self.metrics
            .record_add(postings, start.elapsed().as_secs_f64());
        self.metrics.set_live_documents(self.document_count());
        debug!(doc_id = id, %location, postings, ?group, "added document");
        Ok(())
    }

    /// Reserve a row, preferring the shard whose posting range admits the
    /// document and falling back to any shard with room
    fn request_write_handle(&self, expected_postings: usize) -> Result<DocumentHandle<'_>> {
        let preferred = self
            .shards
            .iter()
            .filter(|shard| shard.admits(expected_postings));
        let others = self
            .shards
            .iter()
            .filter(|shard| !shard.admits(expected_postings));

        for shard in preferred.chain(others) {
            match shard.request_write_handle(expected_postings) {
                Ok(handle) => {
                    self.metrics.set_used_capacity(self.used_capacity_in_bytes());
                    return Ok(handle);
                }
                Err(SluiceError::CapacityExhausted { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        self.metrics.record_add_failure("capacity");
        warn!(expected_postings, "no shard has capacity");
        Err(SluiceError::CapacityExhausted { expected_postings })
    }

    fn shard_for(&self, location: DocumentLocation) -> &Arc<Shard> {
        &self.shards[location.shard.as_usize()]
    }

    /// Remove a document from serving
    ///
    /// Returns false if `id` was never added or is already deleted, so
    /// bulk deletes may safely contain stale ids.
    pub fn delete(&self, id: DocId) -> bool {
        if self.shut_down.load(Ordering::SeqCst) {
            return false;
        }
        let _guard = self.delete_lock.lock();
        self.delete_locked(id)
    }

    fn delete_locked(&self, id: DocId) -> bool {
        let Some(location) = self.document_map.remove(id) else {
            return false;
        };
        let shard = self.shard_for(location);
        shard.tombstone(location);
        self.document_count.fetch_sub(1, Ordering::SeqCst);
        self.recycler.schedule(shard.clone(), location, id);

        self.metrics.record_delete();
        self.metrics.set_live_documents(self.document_count());
        debug!(doc_id = id, %location, "deleted document");
        true
    }

    /// Set or clear a registered fact on a live document
    pub fn assert_fact(&self, id: DocId, fact: FactHandle, value: bool) -> Result<()> {
        self.ensure_running()?;
        if !self.facts.contains(fact) {
            return Err(SluiceError::UnknownFact(fact));
        }
        let location = self
            .document_map
            .lookup(id)
            .ok_or(SluiceError::UnknownDocument(id))?;
        if !self.shard_for(location).assert_fact(location, fact, value) {
            return Err(SluiceError::UnknownDocument(id));
        }
        Ok(())
    }

    pub fn fact(&self, id: DocId, fact: FactHandle) -> Result<bool> {
        if !self.facts.contains(fact) {
            return Err(SluiceError::UnknownFact(fact));
        }
        let location = self
            .document_map
            .lookup(id)
            .ok_or(SluiceError::UnknownDocument(id))?;
        Ok(self.shard_for(location).fact(location, fact))
    }

    /// True iff `id` is visible: added, fully placed, not deleted
    pub fn contains(&self, id: DocId) -> bool {
        self.document_map.contains(id)
    }

    pub fn get_handle(&self, id: DocId) -> Option<DocumentLocation> {
        self.document_map.lookup(id)
    }

    pub fn open_group(&self, id: GroupId) -> Result<()> {
        self.ensure_running()?;
        self.groups.open_group(id)?;
        info!(group = id, "opened group");
        Ok(())
    }

    pub fn close_group(&self) {
        if let Some(id) = self.groups.close_group() {
            info!(group = id, "closed group");
        }
    }

    /// Delete every member of a closed group
    ///
    /// All members are attempted; members already deleted are skipped.
    /// Returns the number of documents actually deleted.
    pub fn expire_group(&self, id: GroupId) -> Result<usize> {
        self.ensure_running()?;
        let _guard = self.delete_lock.lock();
        let members = self.groups.take_for_expiry(id)?;

        let deleted = members
            .iter()
            .filter(|member| self.delete_locked(**member))
            .count();

        self.metrics.record_group_expiry(deleted);
        info!(group = id, members = members.len(), deleted, "expired group");
        Ok(deleted)
    }

    pub fn current_group(&self) -> Option<GroupId> {
        self.groups.current()
    }

    /// Write the document histogram and every shard's statistics
    pub fn write_statistics(&self, files: &dyn FileManager, term_to_text: bool) -> Result<()> {
        let mut out = files.document_histogram()?;
        self.histogram.write(&mut out)?;
        out.flush()?;

        for shard in &self.shards {
            write_shard_statistics(shard, files, term_to_text)?;
        }
        info!(shards = self.shards.len(), "wrote statistics");
        Ok(())
    }

    pub fn statistics_report(&self) -> IngestStatistics {
        let statistics = IngestStatistics {
            document_count: self.document_count(),
            total_source_bytes: self.total_source_bytes_ingested(),
            posting_count: self.posting_count(),
            used_capacity_bytes: self.used_capacity_in_bytes(),
            pending_reclaims: self.recycler.pending(),
            shards: self
                .shards
                .iter()
                .map(|shard| ShardStatistics {
                    shard: shard.id(),
                    documents: shard.document_count(),
                    slices: shard.slice_count(),
                    terms: shard.term_count(),
                })
                .collect(),
        };
        info!(
            documents = statistics.document_count,
            postings = statistics.posting_count,
            source_bytes = statistics.total_source_bytes,
            "ingestion statistics"
        );
        statistics
    }

    pub fn document_count(&self) -> usize {
        self.document_count.load(Ordering::SeqCst)
    }

    pub fn used_capacity_in_bytes(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.used_capacity_in_bytes())
            .sum()
    }

    /// Bytes of source text in every document ever ingested
    pub fn total_source_bytes_ingested(&self) -> usize {
        self.total_source_byte_size.load(Ordering::SeqCst)
    }

    /// Postings in every document ever ingested; not reduced by deletes
    pub fn posting_count(&self) -> usize {
        self.posting_count.load(Ordering::SeqCst)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard(&self, index: usize) -> Option<&Arc<Shard>> {
        self.shards.get(index)
    }

    pub fn document_cache(&self) -> &DocumentCache {
        &self.document_cache
    }

    pub fn facts(&self) -> &Arc<FactSet> {
        &self.facts
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Take a reader token pinning every row visible right now
    pub fn acquire_token(&self) -> Token {
        self.tokens.acquire()
    }

    pub fn recycler(&self) -> &Recycler {
        &self.recycler
    }

    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    /// Stop accepting mutations and release owned resources
    ///
    /// Does not wait for tombstoned rows still pinned by readers.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close_group();
        self.recycler.shutdown();
        info!(documents = self.document_count(), "ingestor shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(SluiceError::ShutDown);
        }
        Ok(())
    }
}
