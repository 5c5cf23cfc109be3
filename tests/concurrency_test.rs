//! Concurrent add/delete stress tests
//!
//! Run with `RUST_LOG=sluice=debug` to see per-document tracing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use sluice::{
    DocId, DocumentFrequencyTable, FactSet, IngestConfig, Ingestor, ShardConfig, SluiceError,
    StreamId, Term, Tokenizer,
};

const THREADS: usize = 8;
const DOCS: usize = 2000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn create_ingestor() -> Arc<Ingestor> {
    let config = IngestConfig::default()
        .with_max_gram_size(2)
        .with_shards(vec![ShardConfig::new(0, 256, 64), ShardConfig::new(4, 256, 64)]);
    Arc::new(
        Ingestor::new(
            config,
            Arc::new(DocumentFrequencyTable::new()),
            Arc::new(FactSet::new()),
        )
        .unwrap(),
    )
}

fn add(ingestor: &Ingestor, tokenizer: &Tokenizer, id: DocId) -> sluice::Result<()> {
    let mut doc = ingestor.new_document();
    let text = if id % 3 == 0 {
        format!("shared token {}", id)
    } else {
        format!("shared {}", id)
    };
    doc.add_stream("body", tokenizer, &text)?;
    ingestor.add(id, Arc::new(doc))
}

/// Ids 0..DOCS shuffled and dealt round-robin to THREADS workers
fn shuffled_batches(seed: u64) -> Vec<Vec<DocId>> {
    let mut ids: Vec<DocId> = (0..DOCS as DocId).collect();
    ids.shuffle(&mut StdRng::seed_from_u64(seed));
    let mut batches = vec![Vec::new(); THREADS];
    for (i, id) in ids.into_iter().enumerate() {
        batches[i % THREADS].push(id);
    }
    batches
}

#[test]
fn test_concurrent_adds() {
    init_tracing();
    let ingestor = create_ingestor();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = shuffled_batches(42)
        .into_iter()
        .map(|batch| {
            let ingestor = ingestor.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let tokenizer = Tokenizer::default();
                barrier.wait();
                for id in batch {
                    add(&ingestor, &tokenizer, id).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ingestor.document_count(), DOCS);
    for id in 0..DOCS as DocId {
        assert!(ingestor.contains(id), "missing document {}", id);
    }

    let shared = Term::new("shared", StreamId(0), &DocumentFrequencyTable::new());
    let visible: usize = (0..ingestor.shard_count())
        .map(|i| ingestor.shard(i).unwrap().documents_containing(&shared).len())
        .sum();
    assert_eq!(visible, DOCS);
}

#[test]
fn test_concurrent_duplicate_adds() {
    init_tracing();
    let ingestor = create_ingestor();
    let barrier = Arc::new(Barrier::new(THREADS + 1));
    let done = Arc::new(AtomicBool::new(false));
    let shared = Term::new("shared", StreamId(0), &DocumentFrequencyTable::new());

    // Samples query results while the adders race
    let reader = {
        let ingestor = ingestor.clone();
        let barrier = barrier.clone();
        let done = done.clone();
        let shared = shared.clone();
        thread::spawn(move || {
            barrier.wait();
            let mut samples = 0;
            while !done.load(Ordering::SeqCst) || samples == 0 {
                let _token = ingestor.acquire_token();
                let mut seen = HashSet::new();
                for i in 0..ingestor.shard_count() {
                    for id in ingestor.shard(i).unwrap().documents_containing(&shared) {
                        assert!(seen.insert(id), "document {} visible twice", id);
                    }
                }
                samples += 1;
            }
        })
    };

    // Every adder races to add the same ids
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ingestor = ingestor.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let tokenizer = Tokenizer::default();
                barrier.wait();
                let mut added = 0;
                for id in 0..DOCS as DocId {
                    match add(&ingestor, &tokenizer, id) {
                        Ok(()) => added += 1,
                        Err(SluiceError::DuplicateDocument(dup)) => assert_eq!(dup, id),
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                added
            })
        })
        .collect();
    let added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    done.store(true, Ordering::SeqCst);
    reader.join().unwrap();

    assert_eq!(added, DOCS);
    assert_eq!(ingestor.document_count(), DOCS);

    // Losing adds never commit, so shard statistics only count real adds
    let committed: u64 = (0..ingestor.shard_count())
        .map(|i| ingestor.shard(i).unwrap().committed_count())
        .sum();
    assert_eq!(committed, DOCS as u64);
    assert_eq!(ingestor.recycler().reclaimed(), 0);

    let visible: usize = (0..ingestor.shard_count())
        .map(|i| ingestor.shard(i).unwrap().documents_containing(&shared).len())
        .sum();
    assert_eq!(visible, DOCS);
}

#[test]
fn test_concurrent_adds_and_deletes() {
    init_tracing();
    let ingestor = create_ingestor();
    let tokenizer = Tokenizer::default();
    for id in 0..(DOCS / 2) as DocId {
        add(&ingestor, &tokenizer, id).unwrap();
    }

    let barrier = Arc::new(Barrier::new(2 * THREADS));
    let mut handles = Vec::new();

    // Adders take the upper half of the id space
    for t in 0..THREADS {
        let ingestor = ingestor.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let tokenizer = Tokenizer::default();
            barrier.wait();
            let mut id = (DOCS / 2 + t) as DocId;
            while id < DOCS as DocId {
                add(&ingestor, &tokenizer, id).unwrap();
                id += THREADS as DocId;
            }
        }));
    }

    // Deleters remove the lower half, with every id attempted twice
    for batch in shuffled_batches(7).into_iter() {
        let ingestor = ingestor.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            for id in batch.into_iter().filter(|id| *id < (DOCS / 2) as DocId) {
                ingestor.delete(id);
                ingestor.delete(id);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ingestor.document_count(), DOCS / 2);
    for id in 0..DOCS as DocId {
        assert_eq!(ingestor.contains(id), id >= (DOCS / 2) as DocId);
    }
    assert!(ingestor.recycler().wait_until_idle(10_000));
    assert_eq!(ingestor.recycler().reclaimed(), (DOCS / 2) as u64);
}

#[test]
fn test_readers_pin_rows_during_deletes() {
    init_tracing();
    let ingestor = create_ingestor();
    let tokenizer = Tokenizer::default();
    for id in 0..100 {
        add(&ingestor, &tokenizer, id).unwrap();
    }

    let reader = ingestor.acquire_token();
    for id in 0..100 {
        assert!(ingestor.delete(id));
    }
    assert_eq!(ingestor.document_count(), 0);
    assert_eq!(ingestor.recycler().reclaimed(), 0);

    drop(reader);
    assert!(ingestor.recycler().wait_until_idle(10_000));
    assert_eq!(ingestor.recycler().reclaimed(), 100);
    for i in 0..ingestor.shard_count() {
        assert_eq!(ingestor.shard(i).unwrap().term_count(), 0);
    }
}
