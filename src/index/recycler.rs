//! Deferred reclamation of tombstoned rows
//!
//! Readers hold a `Token` while they touch shard data. Every reclamation
//! is stamped with the serial the next token would receive; the recycler
//! thread reclaims the row only after every token issued before that
//! stamp has been retired, so no reader that could have seen the row
//! before it was tombstoned is still running.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use super::document_map::DocumentMap;
use super::shard::Shard;
use super::types::{DocId, DocumentLocation};

#[derive(Debug, Default)]
struct TokenState {
    next_serial: u64,
    /// serial -> number of outstanding tokens with that serial
    active: BTreeMap<u64, usize>,
    shutting_down: bool,
}

/// Issues synchronization tokens to readers
#[derive(Debug, Default)]
pub struct TokenManager {
    state: Mutex<TokenState>,
    retired: Condvar,
}

impl TokenManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take a token; it is retired when dropped
    pub fn acquire(self: &Arc<Self>) -> Token {
        let mut state = self.state.lock();
        let serial = state.next_serial;
        state.next_serial += 1;
        *state.active.entry(serial).or_insert(0) += 1;
        Token {
            manager: self.clone(),
            serial,
        }
    }

    fn retire(&self, serial: u64) {
        let mut state = self.state.lock();
        if let Some(count) = state.active.get_mut(&serial) {
            *count -= 1;
            if *count == 0 {
                state.active.remove(&serial);
            }
        }
        self.retired.notify_all();
    }

    /// Serial the next token will receive
    pub fn current_serial(&self) -> u64 {
        self.state.lock().next_serial
    }

    pub fn oldest_active_serial(&self) -> Option<u64> {
        self.state.lock().active.keys().next().copied()
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.values().sum()
    }

    /// Block until every token with a serial below `serial` is retired
    ///
    /// Returns false if the manager shut down first.
    pub fn wait_for_tokens_before(&self, serial: u64) -> bool {
        let mut state = self.state.lock();
        loop {
            match state.active.keys().next() {
                Some(&oldest) if oldest < serial => {}
                _ => return true,
            }
            if state.shutting_down {
                return false;
            }
            self.retired.wait(&mut state);
        }
    }

    /// Wake every waiter; outstanding tokens stay valid
    pub fn shutdown(&self) {
        self.state.lock().shutting_down = true;
        self.retired.notify_all();
    }
}

/// A reader's claim that it may still observe shard data
#[derive(Debug)]
pub struct Token {
    manager: Arc<TokenManager>,
    serial: u64,
}

impl Token {
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.manager.retire(self.serial);
    }
}

struct Reclaim {
    shard: Arc<Shard>,
    location: DocumentLocation,
    doc_id: DocId,
    stamp: u64,
}

/// Background worker reclaiming tombstoned rows
pub struct Recycler {
    tokens: Arc<TokenManager>,
    tx: Mutex<Option<Sender<Reclaim>>>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    reclaimed: Arc<AtomicU64>,
    // Scheduled rows dropped because shutdown came first
    abandoned: Arc<AtomicU64>,
    idle: Arc<(Mutex<()>, Condvar)>,
}

impl Recycler {
    pub fn spawn(tokens: Arc<TokenManager>, document_map: Arc<DocumentMap>) -> Self {
        let (tx, rx) = channel::unbounded::<Reclaim>();
        let pending = Arc::new(AtomicUsize::new(0));
        let reclaimed = Arc::new(AtomicU64::new(0));
        let abandoned = Arc::new(AtomicU64::new(0));
        let idle = Arc::new((Mutex::new(()), Condvar::new()));

        let handle = {
            let tokens = tokens.clone();
            let pending = pending.clone();
            let reclaimed = reclaimed.clone();
            let abandoned = abandoned.clone();
            let idle = idle.clone();
            thread::spawn(move || {
                while let Ok(op) = rx.recv() {
                    if tokens.wait_for_tokens_before(op.stamp) {
                        if op.shard.reclaim(op.location) {
                            reclaimed.fetch_add(1, Ordering::SeqCst);
                        }
                        document_map.purge(op.doc_id, op.location);
                        debug!(doc_id = op.doc_id, location = %op.location, "reclaimed row");
                    } else {
                        abandoned.fetch_add(1, Ordering::SeqCst);
                    }
                    pending.fetch_sub(1, Ordering::SeqCst);
                    let (lock, cv) = &*idle;
                    let _g = lock.lock();
                    cv.notify_all();
                }
            })
        };

        Self {
            tokens,
            tx: Mutex::new(Some(tx)),
            join: Mutex::new(Some(handle)),
            pending,
            reclaimed,
            abandoned,
            idle,
        }
    }

    /// Queue a tombstoned row for reclamation
    ///
    /// Returns false once the recycler has shut down.
    pub fn schedule(&self, shard: Arc<Shard>, location: DocumentLocation, doc_id: DocId) -> bool {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return false;
        };
        let op = Reclaim {
            shard,
            location,
            doc_id,
            stamp: self.tokens.current_serial(),
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(op).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Rows scheduled but not yet processed
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Rows reclaimed so far
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::SeqCst)
    }

    /// Rows left unreclaimed because the recycler shut down while
    /// readers still pinned them
    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Wait until nothing is pending, up to `timeout_ms`
    pub fn wait_until_idle(&self, timeout_ms: u64) -> bool {
        let deadline = Instant::now()
            .checked_add(Duration::from_millis(timeout_ms))
            .unwrap_or_else(Instant::now);
        let (lock, cv) = &*self.idle;
        let mut guard = lock.lock();
        loop {
            if self.pending() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = cv.wait_for(&mut guard, deadline - now);
        }
    }

    /// Stop accepting work and join the worker
    ///
    /// Rows still pinned by outstanding tokens are left unreclaimed.
    pub fn shutdown(&self) {
        let tx = self.tx.lock().take();
        if tx.is_none() {
            return;
        }
        drop(tx);
        self.tokens.shutdown();
        if let Some(handle) = self.join.lock().take() {
            let _ = handle.join();
        }
        info!(
            reclaimed = self.reclaimed(),
            abandoned = self.abandoned(),
            "recycler stopped"
        );
    }
}

impl Drop for Recycler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShardConfig;
    use crate::document::PostingSink;
    use crate::index::ShardId;
    use crate::term::{DocumentFrequencyTable, StreamId, Term};

    fn setup() -> (Arc<Shard>, Arc<DocumentMap>, DocumentLocation, Term) {
        let shard = Arc::new(Shard::new(ShardId(0), &ShardConfig::new(0, 4, 1), None));
        let map = Arc::new(DocumentMap::new());
        let term = Term::new("a", StreamId(0), &DocumentFrequencyTable::new());

        let mut handle = shard.request_write_handle(1).unwrap();
        handle.add_posting(&term);
        let location = handle.commit(1);
        map.insert(1, location).unwrap();

        map.remove(1);
        shard.tombstone(location);
        (shard, map, location, term)
    }

    #[test]
    fn test_token_serials() {
        let tokens = TokenManager::new();
        let first = tokens.acquire();
        let second = tokens.acquire();

        assert_eq!(first.serial(), 0);
        assert_eq!(second.serial(), 1);
        assert_eq!(tokens.oldest_active_serial(), Some(0));
        assert_eq!(tokens.active_count(), 2);

        drop(first);
        assert_eq!(tokens.oldest_active_serial(), Some(1));
        drop(second);
        assert_eq!(tokens.oldest_active_serial(), None);
        assert!(tokens.wait_for_tokens_before(10));
    }

    #[test]
    fn test_reclaims_without_readers() {
        let tokens = TokenManager::new();
        let (shard, map, _, _) = setup();
        let recycler = Recycler::spawn(tokens, map.clone());

        let location = map.get(1).unwrap().location;
        assert!(recycler.schedule(shard.clone(), location, 1));
        assert!(recycler.wait_until_idle(5000));

        assert_eq!(recycler.reclaimed(), 1);
        assert_eq!(shard.term_count(), 0);
        assert!(map.get(1).is_none());
    }

    #[test]
    fn test_waits_for_older_tokens() {
        let tokens = TokenManager::new();
        let (shard, map, location, _) = setup();
        let recycler = Recycler::spawn(tokens.clone(), map.clone());

        let reader = tokens.acquire();
        recycler.schedule(shard.clone(), location, 1);

        // A token taken after scheduling does not hold the row back
        let late_reader = tokens.acquire();

        assert!(!recycler.wait_until_idle(100));
        assert_eq!(shard.term_count(), 1);

        drop(reader);
        assert!(recycler.wait_until_idle(5000));
        assert_eq!(shard.term_count(), 0);
        drop(late_reader);
    }

    #[test]
    fn test_shutdown_leaves_pinned_rows() {
        let tokens = TokenManager::new();
        let (shard, map, location, _) = setup();
        let recycler = Recycler::spawn(tokens.clone(), map.clone());

        let _reader = tokens.acquire();
        recycler.schedule(shard.clone(), location, 1);
        recycler.shutdown();

        assert_eq!(shard.term_count(), 1);
        assert_eq!(recycler.reclaimed(), 0);
        assert_eq!(recycler.abandoned(), 1);
        assert_eq!(recycler.pending(), 0);
        assert!(!recycler.schedule(shard, location, 1));
    }
}
