//! Streaming n-gram generation for a single source document

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::IngestConfig;
use crate::error::{Result, SluiceError};
use crate::term::{DocumentFrequencyTable, StreamId, Term};
use crate::tokenizer::Tokenizer;

use super::ring_buffer::RingBuffer;

/// Destination for a document's postings
pub trait PostingSink {
    fn add_posting(&mut self, term: &Term);
}

impl PostingSink for Vec<Term> {
    fn add_posting(&mut self, term: &Term) {
        self.push(term.clone());
    }
}

/// Settings every document built for one index shares
#[derive(Clone, Debug)]
pub struct Configuration {
    max_gram_size: usize,
    frequencies: Arc<DocumentFrequencyTable>,
}

impl Configuration {
    pub fn new(max_gram_size: usize, frequencies: Arc<DocumentFrequencyTable>) -> Result<Self> {
        if max_gram_size == 0 || max_gram_size > Term::MAX_GRAM_SIZE {
            return Err(SluiceError::InvalidConfig(format!(
                "max_gram_size must be in 1..={}, got {}",
                Term::MAX_GRAM_SIZE,
                max_gram_size
            )));
        }
        Ok(Self {
            max_gram_size,
            frequencies,
        })
    }

    pub fn from_config(
        config: &IngestConfig,
        frequencies: Arc<DocumentFrequencyTable>,
    ) -> Result<Self> {
        Self::new(config.max_gram_size, frequencies)
    }

    pub fn max_gram_size(&self) -> usize {
        self.max_gram_size
    }

    pub fn frequencies(&self) -> &Arc<DocumentFrequencyTable> {
        &self.frequencies
    }
}

/// A source document being turned into unique n-gram terms
///
/// Terms arrive one stream at a time (`open_stream`, `add_term`*,
/// `close_stream`). A ring buffer holding the last `max_gram_size` terms
/// slides over each stream; every time it fills, all n-grams starting at
/// its oldest term are emitted and the oldest term is dropped. Closing the
/// stream drains the remaining shorter windows. Memory per stream is
/// bounded by `max_gram_size` regardless of document length.
///
/// Not safe for concurrent writers. Once handed to the ingestor it is
/// read-only.
#[derive(Debug)]
pub struct Document {
    max_gram_size: usize,
    frequencies: Arc<DocumentFrequencyTable>,
    ring: RingBuffer<Term>,
    terms: HashSet<Term>,
    raw_term_count: usize,
    source_byte_size: usize,
    stream_open: bool,
    current_stream: StreamId,
    stream_names: Vec<String>,
}

impl Document {
    /// Streams a document may open (one `StreamId` each)
    pub const MAX_STREAMS: usize = u8::MAX as usize + 1;

    pub fn new(config: &Configuration) -> Self {
        Self {
            max_gram_size: config.max_gram_size,
            frequencies: config.frequencies.clone(),
            ring: RingBuffer::new(config.max_gram_size),
            terms: HashSet::new(),
            raw_term_count: 0,
            source_byte_size: 0,
            stream_open: false,
            current_stream: StreamId::default(),
            stream_names: Vec::new(),
        }
    }

    pub fn open_stream(&mut self, name: &str) -> Result<()> {
        if self.stream_open {
            return Err(SluiceError::StreamAlreadyOpen);
        }
        if self.stream_names.len() >= Self::MAX_STREAMS {
            return Err(SluiceError::TooManyStreams {
                limit: Self::MAX_STREAMS,
            });
        }

        self.stream_open = true;
        self.current_stream = StreamId(self.stream_names.len() as u8);
        self.stream_names.push(name.to_string());

        // Nothing from an earlier stream may leak into this one.
        self.ring.reset();
        Ok(())
    }

    pub fn add_term(&mut self, text: &str) -> Result<()> {
        if !self.stream_open {
            return Err(SluiceError::NoOpenStream);
        }

        self.raw_term_count += 1;
        self.source_byte_size += text.len();

        let term = Term::new(text, self.current_stream, &self.frequencies);
        self.ring.push_back(term);

        if self.ring.len() == self.max_gram_size {
            self.process_ngrams();
            self.ring.pop_front();
        }
        Ok(())
    }

    pub fn close_stream(&mut self) -> Result<()> {
        if !self.stream_open {
            return Err(SluiceError::NoOpenStream);
        }
        self.stream_open = false;

        while !self.ring.is_empty() {
            self.process_ngrams();
            self.ring.pop_front();
        }
        Ok(())
    }

    /// Tokenize `text` and add every token to the open stream
    ///
    /// Returns the number of terms added.
    pub fn add_text(&mut self, tokenizer: &Tokenizer, text: &str) -> Result<usize> {
        let tokens = tokenizer.tokenize(text);
        for token in &tokens {
            self.add_term(token)?;
        }
        Ok(tokens.len())
    }

    /// Convenience for `open_stream`, `add_text`, `close_stream`
    pub fn add_stream(&mut self, name: &str, tokenizer: &Tokenizer, text: &str) -> Result<usize> {
        self.open_stream(name)?;
        let added = self.add_text(tokenizer, text)?;
        self.close_stream()?;
        Ok(added)
    }

    /// Hand one posting per unique term to `sink`
    ///
    /// Fails while a stream is still open, since its trailing n-grams have
    /// not been generated yet.
    pub fn ingest<S: PostingSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        if self.stream_open {
            return Err(SluiceError::StreamAlreadyOpen);
        }
        for term in &self.terms {
            sink.add_posting(term);
        }
        Ok(())
    }

    /// Emit the growing n-grams anchored at the oldest term in the window
    fn process_ngrams(&mut self) {
        let count = self.ring.len();
        debug_assert!(count > 0);

        let mut term = self.ring[0].clone();
        for n in 1..count {
            let next = term.compose(&self.ring[n], &self.frequencies);
            self.terms.insert(term);
            term = next;
        }
        self.terms.insert(term);
    }

    /// Number of unique terms, i.e. postings `ingest` will emit
    pub fn posting_count(&self) -> usize {
        self.terms.len()
    }

    pub fn raw_term_count(&self) -> usize {
        self.raw_term_count
    }

    /// Bytes of raw term text added across all streams
    pub fn source_byte_size(&self) -> usize {
        self.source_byte_size
    }

    pub fn max_gram_size(&self) -> usize {
        self.max_gram_size
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter()
    }

    pub fn contains_term(&self, text: &str) -> bool {
        self.terms.iter().any(|t| t.text() == text)
    }

    pub fn is_stream_open(&self) -> bool {
        self.stream_open
    }

    pub fn stream_names(&self) -> &[String] {
        &self.stream_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenizerConfig;

    fn config(max_gram_size: usize) -> Configuration {
        Configuration::new(max_gram_size, Arc::new(DocumentFrequencyTable::new())).unwrap()
    }

    fn build(max_gram_size: usize, words: &[&str]) -> Document {
        let mut doc = Document::new(&config(max_gram_size));
        doc.open_stream("body").unwrap();
        for word in words {
            doc.add_term(word).unwrap();
        }
        doc.close_stream().unwrap();
        doc
    }

    fn texts(doc: &Document) -> Vec<String> {
        let mut texts: Vec<String> = doc.terms().map(|t| t.text().to_string()).collect();
        texts.sort();
        texts
    }

    #[test]
    fn test_bigrams_of_three_terms() {
        let doc = build(2, &["a", "b", "c"]);
        assert_eq!(texts(&doc), vec!["a", "a b", "b", "b c", "c"]);
        assert_eq!(doc.posting_count(), 5);
        assert!(!doc.contains_term("a b c"));
    }

    #[test]
    fn test_trigrams_of_four_terms() {
        let doc = build(3, &["a", "b", "c", "d"]);
        assert_eq!(
            texts(&doc),
            vec!["a", "a b", "a b c", "b", "b c", "b c d", "c", "c d", "d"]
        );
    }

    #[test]
    fn test_unigrams_only() {
        let doc = build(1, &["x", "y", "x"]);
        assert_eq!(texts(&doc), vec!["x", "y"]);
        assert_eq!(doc.raw_term_count(), 3);
        assert_eq!(doc.source_byte_size(), 3);
    }

    #[test]
    fn test_short_stream_shorter_than_window() {
        let doc = build(4, &["a", "b"]);
        assert_eq!(texts(&doc), vec!["a", "a b", "b"]);
    }

    #[test]
    fn test_empty_stream() {
        let doc = build(3, &[]);
        assert_eq!(doc.posting_count(), 0);
    }

    #[test]
    fn test_streams_do_not_join() {
        let mut doc = Document::new(&config(2));
        doc.open_stream("title").unwrap();
        doc.add_term("a").unwrap();
        doc.close_stream().unwrap();
        doc.open_stream("body").unwrap();
        doc.add_term("b").unwrap();
        doc.close_stream().unwrap();

        assert_eq!(texts(&doc), vec!["a", "b"]);
        assert_eq!(doc.stream_names(), ["title", "body"]);
    }

    #[test]
    fn test_term_count_bounds() {
        let words: Vec<String> = (0..50).map(|i| format!("w{}", i % 7)).collect();
        let words: Vec<&str> = words.iter().map(|s| s.as_str()).collect();
        for k in 1..=4 {
            let doc = build(k, &words);
            let l = words.len();
            assert!(doc.posting_count() <= l * k - k * (k - 1) / 2);
            assert!(doc.posting_count() >= 7);
        }
    }

    #[test]
    fn test_stream_state_errors() {
        let mut doc = Document::new(&config(2));
        assert!(matches!(doc.add_term("a"), Err(SluiceError::NoOpenStream)));
        assert!(matches!(doc.close_stream(), Err(SluiceError::NoOpenStream)));

        doc.open_stream("body").unwrap();
        let err = doc.open_stream("body").unwrap_err();
        assert!(matches!(err, SluiceError::StreamAlreadyOpen));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_ingest_requires_closed_stream() {
        let mut doc = Document::new(&config(2));
        doc.open_stream("body").unwrap();
        doc.add_term("a").unwrap();

        let mut sink: Vec<Term> = Vec::new();
        assert!(matches!(
            doc.ingest(&mut sink),
            Err(SluiceError::StreamAlreadyOpen)
        ));

        doc.close_stream().unwrap();
        doc.ingest(&mut sink).unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_ingest_posts_each_term_once() {
        let doc = build(2, &["a", "b", "a", "b"]);
        let mut sink: Vec<Term> = Vec::new();
        doc.ingest(&mut sink).unwrap();

        // a, b, a b, b a
        assert_eq!(sink.len(), 4);
        assert_eq!(sink.len(), doc.posting_count());
    }

    #[test]
    fn test_add_stream_with_tokenizer() {
        let tokenizer = Tokenizer::new(&TokenizerConfig::default());
        let mut doc = Document::new(&config(2));
        let added = doc.add_stream("body", &tokenizer, "Hello, World!").unwrap();

        assert_eq!(added, 2);
        assert_eq!(texts(&doc), vec!["hello", "hello world", "world"]);
    }

    #[test]
    fn test_too_many_streams() {
        let mut doc = Document::new(&config(1));
        for _ in 0..Document::MAX_STREAMS {
            doc.open_stream("s").unwrap();
            doc.close_stream().unwrap();
        }
        assert!(matches!(
            doc.open_stream("s"),
            Err(SluiceError::TooManyStreams { .. })
        ));
    }
}
