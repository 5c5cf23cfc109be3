//! Recently ingested documents, kept for query verification

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::index::DocId;

use super::document::Document;

/// Bounded FIFO cache of ingested documents
///
/// Oldest entries are evicted first. A capacity of 0 disables caching.
#[derive(Debug)]
pub struct DocumentCache {
    capacity: usize,
    entries: RwLock<VecDeque<(DocId, Arc<Document>)>>,
}

impl DocumentCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(4096))),
        }
    }

    pub fn insert(&self, id: DocId, document: Arc<Document>) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back((id, document));
    }

    /// Most recently cached document with this id
    pub fn get(&self, id: DocId) -> Option<Arc<Document>> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|(cached, _)| *cached == id)
            .map(|(_, doc)| doc.clone())
    }

    /// Snapshot of the cache contents, oldest first
    pub fn snapshot(&self) -> Vec<(DocId, Arc<Document>)> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
