//! Documents: streaming n-gram generation and the diagnostics cache
//!
//! - `RingBuffer`: fixed window over the most recent terms of a stream
//! - `Document`: turns term streams into a deduplicated set of n-grams
//! - `DocumentCache`: recently ingested documents for query verification

mod cache;
#[allow(clippy::module_inception)]
mod document;
mod ring_buffer;

pub use cache::DocumentCache;
pub use document::{Configuration, Document, PostingSink};
pub use ring_buffer::RingBuffer;
