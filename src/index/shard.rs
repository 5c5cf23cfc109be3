//! Shards, their fixed-size slices, and write handles for placing a
//! document's postings
//!
//! A shard owns slices of `slice_capacity` rows. Each ingested document
//! occupies one row, addressed globally within the shard as
//! `slice * slice_capacity + row`. Postings are kept as a term -> row
//! bitmap. A row only becomes visible to readers once committed and stops
//! being visible the moment it is tombstoned; its postings are physically
//! removed later by `reclaim`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use roaring::RoaringBitmap;

use crate::config::ShardConfig;
use crate::document::PostingSink;
use crate::error::{Result, SluiceError};
use crate::term::{IdfX10, Term};

use super::types::{DocId, DocumentLocation, FactHandle, ShardId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RowState {
    Free,
    /// Handed out to a writer, not yet committed
    Reserved,
    Live,
    Tombstoned,
}

#[derive(Debug)]
struct Row {
    state: RowState,
    doc_id: DocId,
    facts: u64,
    terms: Vec<Term>,
}

impl Row {
    fn free() -> Self {
        Self {
            state: RowState::Free,
            doc_id: 0,
            facts: 0,
            terms: Vec::new(),
        }
    }

    fn clear(&mut self) {
        self.state = RowState::Free;
        self.doc_id = 0;
        self.facts = 0;
        self.terms = Vec::new();
    }
}

/// A fixed-size block of rows
#[derive(Debug)]
struct Slice {
    rows: Box<[Mutex<Row>]>,
}

impl Slice {
    fn new(capacity: usize) -> Self {
        Self {
            rows: (0..capacity).map(|_| Mutex::new(Row::free())).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct RowAllocator {
    /// First global row never handed out
    next_unused: u32,
    /// Reclaimed rows, reused before growing
    free: Vec<u32>,
}

pub struct Shard {
    id: ShardId,
    min_postings: usize,
    max_postings: Option<usize>,
    slice_capacity: usize,
    max_slices: usize,
    slices: RwLock<Vec<Arc<Slice>>>,
    allocator: Mutex<RowAllocator>,
    /// Term -> rows holding a posting for it (committed or not)
    postings: DashMap<Term, RoaringBitmap>,
    /// Committed rows not yet tombstoned
    live_rows: RwLock<RoaringBitmap>,
    live_count: AtomicUsize,
    /// Documents ever committed; never decremented
    committed: AtomicU64,
    /// Documents ever committed containing each term
    term_documents: DashMap<Term, u64>,
    /// Unique terms seen after each committed document
    cumulative_term_counts: Mutex<Vec<u64>>,
}

impl Shard {
    /// Create a shard accepting documents with posting counts in
    /// `[config.min_postings, max_postings)`; `None` means unbounded
    pub fn new(id: ShardId, config: &ShardConfig, max_postings: Option<usize>) -> Self {
        Self {
            id,
            min_postings: config.min_postings,
            max_postings,
            slice_capacity: config.slice_capacity,
            max_slices: config.max_slices,
            slices: RwLock::new(Vec::new()),
            allocator: Mutex::new(RowAllocator::default()),
            postings: DashMap::new(),
            live_rows: RwLock::new(RoaringBitmap::new()),
            live_count: AtomicUsize::new(0),
            committed: AtomicU64::new(0),
            term_documents: DashMap::new(),
            cumulative_term_counts: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ShardId {
        self.id
    }

    /// Whether documents with this many postings belong in this shard
    pub fn admits(&self, posting_count: usize) -> bool {
        posting_count >= self.min_postings
            && self.max_postings.map_or(true, |max| posting_count < max)
    }

    /// Reserve a row for a document expected to have
    /// `expected_posting_count` postings
    ///
    /// Reclaimed rows are reused first. A new slice is allocated when all
    /// existing slices are full; once `max_slices` is reached the shard is
    /// at capacity.
    pub fn request_write_handle(&self, expected_posting_count: usize) -> Result<DocumentHandle<'_>> {
        let row_id = {
            let mut allocator = self.allocator.lock();
            match allocator.free.pop() {
                Some(row_id) => row_id,
                None => {
                    let row_id = allocator.next_unused;
                    let slice = row_id as usize / self.slice_capacity;
                    if slice >= self.max_slices || row_id == u32::MAX {
                        return Err(SluiceError::CapacityExhausted {
                            expected_postings: expected_posting_count,
                        });
                    }
                    {
                        let mut slices = self.slices.write();
                        if slice == slices.len() {
                            slices.push(Arc::new(Slice::new(self.slice_capacity)));
                        }
                    }
                    allocator.next_unused += 1;
                    row_id
                }
            }
        };

        let location = self.location_of(row_id);
        self.with_row(location, |row| {
            row.clear();
            row.state = RowState::Reserved;
        });

        Ok(DocumentHandle {
            shard: self,
            location,
            row_id,
            terms: Vec::with_capacity(expected_posting_count),
        })
    }

    fn location_of(&self, row_id: u32) -> DocumentLocation {
        let slice_capacity = self.slice_capacity as u32;
        DocumentLocation::new(self.id, row_id / slice_capacity, row_id % slice_capacity)
    }

    fn row_id_of(&self, location: DocumentLocation) -> Option<u32> {
        if location.shard != self.id || location.row as usize >= self.slice_capacity {
            return None;
        }
        location
            .slice
            .checked_mul(self.slice_capacity as u32)?
            .checked_add(location.row)
    }

    fn with_row<R>(&self, location: DocumentLocation, f: impl FnOnce(&mut Row) -> R) -> Option<R> {
        if location.shard != self.id {
            return None;
        }
        let slice = self.slices.read().get(location.slice as usize)?.clone();
        let mut row = slice.rows.get(location.row as usize)?.lock();
        Some(f(&mut row))
    }

    fn commit(&self, handle: DocumentHandle<'_>, doc_id: DocId) -> DocumentLocation {
        let DocumentHandle {
            location,
            row_id,
            terms,
            ..
        } = handle;

        for term in &terms {
            *self.term_documents.entry(term.clone()).or_insert(0) += 1;
        }
        {
            let mut counts = self.cumulative_term_counts.lock();
            counts.push(self.term_documents.len() as u64);
        }
        self.committed.fetch_add(1, Ordering::SeqCst);

        self.with_row(location, |row| {
            row.state = RowState::Live;
            row.doc_id = doc_id;
            row.terms = terms;
        });
        self.live_rows.write().insert(row_id);
        self.live_count.fetch_add(1, Ordering::SeqCst);
        location
    }

    /// Hide a committed row from readers. Its postings stay in place
    /// until `reclaim`.
    pub fn tombstone(&self, location: DocumentLocation) -> bool {
        let Some(row_id) = self.row_id_of(location) else {
            return false;
        };
        let tombstoned = self
            .with_row(location, |row| {
                if row.state == RowState::Live {
                    row.state = RowState::Tombstoned;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if tombstoned {
            self.live_rows.write().remove(row_id);
            self.live_count.fetch_sub(1, Ordering::SeqCst);
        }
        tombstoned
    }

    /// Physically remove a row's postings and return the row to the free
    /// list. Only valid once no reader can still observe the row.
    pub fn reclaim(&self, location: DocumentLocation) -> bool {
        let Some(row_id) = self.row_id_of(location) else {
            return false;
        };
        let terms = self.with_row(location, |row| match row.state {
            RowState::Tombstoned | RowState::Reserved => {
                let terms = std::mem::take(&mut row.terms);
                row.clear();
                Some(terms)
            }
            RowState::Free | RowState::Live => None,
        });
        let Some(Some(terms)) = terms else {
            return false;
        };

        self.remove_postings(row_id, &terms);
        self.allocator.lock().free.push(row_id);
        true
    }

    fn remove_postings(&self, row_id: u32, terms: &[Term]) {
        for term in terms {
            if let Some(mut rows) = self.postings.get_mut(term) {
                rows.remove(row_id);
            }
            self.postings.remove_if(term, |_, rows| rows.is_empty());
        }
    }

    /// Undo a reservation that will never be committed
    fn release(&self, handle: DocumentHandle<'_>) {
        let DocumentHandle {
            location,
            row_id,
            terms,
            ..
        } = handle;
        self.remove_postings(row_id, &terms);
        self.with_row(location, Row::clear);
        self.allocator.lock().free.push(row_id);
    }

    /// Rows visible to readers that contain `term`
    pub fn postings(&self, term: &Term) -> RoaringBitmap {
        match self.postings.get(term) {
            Some(rows) => &*rows & &*self.live_rows.read(),
            None => RoaringBitmap::new(),
        }
    }

    /// Visible documents containing `term`
    pub fn documents_containing(&self, term: &Term) -> Vec<DocId> {
        self.postings(term)
            .iter()
            .filter_map(|row_id| self.row_doc_id(self.location_of(row_id)))
            .collect()
    }

    pub fn is_row_live(&self, location: DocumentLocation) -> bool {
        self.with_row(location, |row| row.state == RowState::Live)
            .unwrap_or(false)
    }

    /// Document occupying a live row
    pub fn row_doc_id(&self, location: DocumentLocation) -> Option<DocId> {
        self.with_row(location, |row| (row.state == RowState::Live).then_some(row.doc_id))
            .flatten()
    }

    /// Set or clear `fact` on a live row
    ///
    /// Returns false for a handle outside the 64 fact bits a row holds.
    pub fn assert_fact(&self, location: DocumentLocation, fact: FactHandle, value: bool) -> bool {
        let Some(bit) = fact_bit(fact) else {
            return false;
        };
        self.with_row(location, |row| {
            if row.state != RowState::Live {
                return false;
            }
            if value {
                row.facts |= bit;
            } else {
                row.facts &= !bit;
            }
            true
        })
        .unwrap_or(false)
    }

    pub fn fact(&self, location: DocumentLocation, fact: FactHandle) -> bool {
        let Some(bit) = fact_bit(fact) else {
            return false;
        };
        self.with_row(location, |row| row.state == RowState::Live && row.facts & bit != 0)
        .unwrap_or(false)
    }

    /// Live documents in this shard
    pub fn document_count(&self) -> usize {
        self.live_count.load(Ordering::SeqCst)
    }

    /// Documents ever committed to this shard
    pub fn committed_count(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn slice_count(&self) -> usize {
        self.slices.read().len()
    }

    pub fn slice_capacity(&self) -> usize {
        self.slice_capacity
    }

    /// Bytes reserved by allocated slices
    pub fn used_capacity_in_bytes(&self) -> usize {
        self.slice_count() * self.slice_capacity * std::mem::size_of::<Mutex<Row>>()
    }

    /// Distinct terms with postings in this shard
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn cumulative_term_counts(&self) -> Vec<u64> {
        self.cumulative_term_counts.lock().clone()
    }

    /// Fraction of committed documents containing each term, most
    /// frequent first
    pub fn document_frequencies(&self) -> Vec<(Term, f64)> {
        let committed = self.committed_count();
        if committed == 0 {
            return Vec::new();
        }
        let mut frequencies: Vec<(Term, f64)> = self
            .term_documents
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value() as f64 / committed as f64))
            .collect();
        frequencies.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.text().cmp(b.0.text()))
        });
        frequencies
    }

    /// `(raw_hash, idf)` for every term, ordered by hash
    pub fn indexed_idf_table(&self) -> Vec<(u64, IdfX10)> {
        let mut table: Vec<(u64, IdfX10)> = self
            .document_frequencies()
            .into_iter()
            .map(|(term, df)| (term.raw_hash(), IdfX10::from_frequency(df)))
            .collect();
        table.sort_by_key(|(hash, _)| *hash);
        table.dedup_by_key(|(hash, _)| *hash);
        table
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("id", &self.id)
            .field("min_postings", &self.min_postings)
            .field("max_postings", &self.max_postings)
            .field("slices", &self.slice_count())
            .field("documents", &self.document_count())
            .finish()
    }
}

fn fact_bit(fact: FactHandle) -> Option<u64> {
    1u64.checked_shl(u32::from(fact.0))
}

/// Write access to one reserved row
///
/// Postings added through the handle are invisible until `commit`.
/// Dropping the handle without committing leaves the row reserved; use
/// `abandon` to return it.
pub struct DocumentHandle<'a> {
    shard: &'a Shard,
    location: DocumentLocation,
    row_id: u32,
    terms: Vec<Term>,
}

impl<'a> DocumentHandle<'a> {
    pub fn location(&self) -> DocumentLocation {
        self.location
    }

    pub fn posting_count(&self) -> usize {
        self.terms.len()
    }

    /// Make the row visible as `doc_id`
    pub fn commit(self, doc_id: DocId) -> DocumentLocation {
        let shard = self.shard;
        shard.commit(self, doc_id)
    }

    /// Give the row back without publishing it
    pub fn abandon(self) {
        let shard = self.shard;
        shard.release(self);
    }
}

impl PostingSink for DocumentHandle<'_> {
    fn add_posting(&mut self, term: &Term) {
        self.shard
            .postings
            .entry(term.clone())
            .or_default()
            .insert(self.row_id);
        self.terms.push(term.clone());
    }
}
