//! Concurrent mapping from external document id to row location
//!
//! An add first reserves its id in the `Placing` state, before its row is
//! published, so two adds of one id never both reach a shard. Removal
//! only tombstones the entry. The row behind a tombstoned entry may still
//! be read by in-flight queries, so the entry is purged by the recycler
//! once the row has actually been reclaimed.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{Result, SluiceError};

use super::types::{DocId, DocumentLocation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// Claimed by an add whose row is not yet published
    Placing,
    Live,
    Tombstoned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentEntry {
    pub location: DocumentLocation,
    pub state: EntryState,
}

impl DocumentEntry {
    fn placing(location: DocumentLocation) -> Self {
        Self {
            location,
            state: EntryState::Placing,
        }
    }

    pub fn is_live(&self) -> bool {
        self.state == EntryState::Live
    }
}

#[derive(Debug, Default)]
pub struct DocumentMap {
    entries: DashMap<DocId, DocumentEntry>,
    live: AtomicUsize,
    tombstoned: AtomicUsize,
}

impl DocumentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live document in one step
    pub fn insert(&self, id: DocId, location: DocumentLocation) -> Result<()> {
        self.reserve(id, location)?;
        self.publish(id, location);
        Ok(())
    }

    /// Claim `id` for a row about to be published at `location`
    ///
    /// Fails if `id` is live or claimed by another add. A tombstoned
    /// entry for `id` is replaced, which is how ids are reused after
    /// deletion. The claimed id stays invisible until `publish`.
    pub fn reserve(&self, id: DocId, location: DocumentLocation) -> Result<()> {
        match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().state != EntryState::Tombstoned {
                    return Err(SluiceError::DuplicateDocument(id));
                }
                occupied.insert(DocumentEntry::placing(location));
                self.tombstoned.fetch_sub(1, Ordering::SeqCst);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(DocumentEntry::placing(location));
            }
        }
        Ok(())
    }

    /// Make a reserved id live
    pub fn publish(&self, id: DocId, location: DocumentLocation) -> bool {
        let Some(mut entry) = self.entries.get_mut(&id) else {
            return false;
        };
        if entry.state != EntryState::Placing || entry.location != location {
            return false;
        }
        entry.state = EntryState::Live;
        self.live.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Drop a reservation whose row was never published
    pub fn release(&self, id: DocId, location: DocumentLocation) -> bool {
        self.entries
            .remove_if(&id, |_, entry| {
                entry.state == EntryState::Placing && entry.location == location
            })
            .is_some()
    }

    /// Location of a live document
    pub fn lookup(&self, id: DocId) -> Option<DocumentLocation> {
        self.entries
            .get(&id)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.location)
    }

    /// Tombstone a live document, returning the location it occupied
    ///
    /// Returns `None` when `id` is unknown or already tombstoned.
    pub fn remove(&self, id: DocId) -> Option<DocumentLocation> {
        let mut entry = self.entries.get_mut(&id)?;
        if !entry.is_live() {
            return None;
        }
        entry.state = EntryState::Tombstoned;
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.tombstoned.fetch_add(1, Ordering::SeqCst);
        Some(entry.location)
    }

    pub fn contains(&self, id: DocId) -> bool {
        self.entries
            .get(&id)
            .map(|entry| entry.is_live())
            .unwrap_or(false)
    }

    /// Drop the tombstone for `id` once `location` has been reclaimed
    ///
    /// Does nothing if the id was re-added in the meantime.
    pub fn purge(&self, id: DocId, location: DocumentLocation) -> bool {
        let removed = self
            .entries
            .remove_if(&id, |_, entry| {
                entry.state == EntryState::Tombstoned && entry.location == location
            })
            .is_some();
        if removed {
            self.tombstoned.fetch_sub(1, Ordering::SeqCst);
        }
        removed
    }

    pub fn get(&self, id: DocId) -> Option<DocumentEntry> {
        self.entries.get(&id).map(|entry| *entry)
    }

    /// Number of live documents
    pub fn len(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tombstoned entries not yet purged
    pub fn tombstoned_count(&self) -> usize {
        self.tombstoned.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ShardId;

    fn loc(row: u32) -> DocumentLocation {
        DocumentLocation::new(ShardId(0), 0, row)
    }

    #[test]
    fn test_insert_lookup() {
        let map = DocumentMap::new();
        map.insert(100, loc(0)).unwrap();
        map.insert(200, loc(1)).unwrap();

        assert_eq!(map.lookup(100), Some(loc(0)));
        assert_eq!(map.lookup(200), Some(loc(1)));
        assert_eq!(map.lookup(300), None);
        assert!(map.contains(100));
        assert!(!map.contains(300));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_duplicate_insert() {
        let map = DocumentMap::new();
        map.insert(1, loc(0)).unwrap();
        assert!(matches!(
            map.insert(1, loc(1)),
            Err(SluiceError::DuplicateDocument(1))
        ));
        assert_eq!(map.lookup(1), Some(loc(0)));
    }

    #[test]
    fn test_remove_tombstones() {
        let map = DocumentMap::new();
        map.insert(1, loc(0)).unwrap();

        assert_eq!(map.remove(1), Some(loc(0)));
        assert_eq!(map.remove(1), None);
        assert_eq!(map.remove(2), None);

        assert!(!map.contains(1));
        assert_eq!(map.lookup(1), None);
        assert_eq!(map.len(), 0);
        assert_eq!(map.tombstoned_count(), 1);
        assert_eq!(map.get(1).map(|e| e.state), Some(EntryState::Tombstoned));
    }

    #[test]
    fn test_reuse_after_delete() {
        let map = DocumentMap::new();
        map.insert(1, loc(0)).unwrap();
        map.remove(1);
        map.insert(1, loc(5)).unwrap();

        assert_eq!(map.lookup(1), Some(loc(5)));
        assert_eq!(map.tombstoned_count(), 0);

        // A late purge of the old row must not drop the new entry
        assert!(!map.purge(1, loc(0)));
        assert!(map.contains(1));
    }

    #[test]
    fn test_reserved_id_is_invisible_and_exclusive() {
        let map = DocumentMap::new();
        map.reserve(1, loc(0)).unwrap();

        assert!(!map.contains(1));
        assert_eq!(map.lookup(1), None);
        assert_eq!(map.remove(1), None);
        assert_eq!(map.len(), 0);
        assert!(matches!(
            map.reserve(1, loc(1)),
            Err(SluiceError::DuplicateDocument(1))
        ));

        assert!(!map.publish(1, loc(1)));
        assert!(map.publish(1, loc(0)));
        assert_eq!(map.lookup(1), Some(loc(0)));
        assert_eq!(map.len(), 1);
        assert!(!map.release(1, loc(0)));
    }

    #[test]
    fn test_release_reservation() {
        let map = DocumentMap::new();
        map.reserve(1, loc(0)).unwrap();
        assert!(map.release(1, loc(0)));
        assert!(map.get(1).is_none());

        map.reserve(1, loc(2)).unwrap();
        assert!(map.publish(1, loc(2)));
    }

    #[test]
    fn test_reserve_over_tombstone() {
        let map = DocumentMap::new();
        map.insert(1, loc(0)).unwrap();
        map.remove(1);
        map.reserve(1, loc(3)).unwrap();

        assert_eq!(map.tombstoned_count(), 0);
        assert!(!map.contains(1));
        // Reclaiming the old row leaves the reservation alone
        assert!(!map.purge(1, loc(0)));
        assert!(map.publish(1, loc(3)));
    }

    #[test]
    fn test_purge() {
        let map = DocumentMap::new();
        map.insert(1, loc(0)).unwrap();
        assert!(!map.purge(1, loc(0)));

        map.remove(1);
        assert!(map.purge(1, loc(0)));
        assert!(map.get(1).is_none());
        assert_eq!(map.tombstoned_count(), 0);
    }
}
