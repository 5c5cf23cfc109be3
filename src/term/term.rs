//! Terms: unigrams and the n-grams composed from them

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use super::frequency::DocumentFrequencyTable;

/// Identifies the stream (title, body, ...) a term came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub u8);

impl StreamId {
    pub fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream_{}", self.0)
    }
}

/// Document frequency class: ten times the inverse document frequency,
/// `round(10 * log10(1 / df))`, clamped to `[0, MAX]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdfX10(pub u8);

impl IdfX10 {
    /// Class given to terms too rare to be in the frequency table
    pub const MAX: IdfX10 = IdfX10(60);

    pub fn from_frequency(df: f64) -> Self {
        if df.is_nan() || df <= 0.0 {
            return Self::MAX;
        }
        let idf = (10.0 * (1.0 / df).log10()).round();
        if idf <= 0.0 {
            IdfX10(0)
        } else if idf >= Self::MAX.0 as f64 {
            Self::MAX
        } else {
            IdfX10(idf as u8)
        }
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl Default for IdfX10 {
    fn default() -> Self {
        Self::MAX
    }
}

/// An immutable unigram or n-gram
///
/// Equality and hashing use the canonical text and the frequency class.
/// The stream id and gram size are carried along but do not take part in
/// equality: the same phrase seen in two streams is one posting.
#[derive(Clone, Serialize, Deserialize)]
pub struct Term {
    text: String,
    stream: StreamId,
    gram_size: u8,
    idf: IdfX10,
    /// Stable hash of `text`, identical across processes
    raw_hash: u64,
}

impl Term {
    /// Largest n-gram order a composed term may reach
    pub const MAX_GRAM_SIZE: usize = 8;

    /// Separator placed between the words of a composed term
    pub const SEPARATOR: char = ' ';

    /// Create a unigram, classifying it with `frequencies`
    pub fn new(text: &str, stream: StreamId, frequencies: &DocumentFrequencyTable) -> Self {
        Self {
            text: text.to_string(),
            stream,
            gram_size: 1,
            idf: frequencies.classify(text),
            raw_hash: xxh3_64(text.as_bytes()),
        }
    }

    /// Compose a higher-order term: `self` followed by `other`
    ///
    /// The frequency class is re-derived from the composed text rather than
    /// combined from the classes of the two parts.
    pub fn compose(&self, other: &Term, frequencies: &DocumentFrequencyTable) -> Term {
        let mut text = String::with_capacity(self.text.len() + 1 + other.text.len());
        text.push_str(&self.text);
        text.push(Self::SEPARATOR);
        text.push_str(&other.text);

        let gram_size = (self.gram_size as usize + other.gram_size as usize)
            .min(Self::MAX_GRAM_SIZE) as u8;
        let idf = frequencies.classify(&text);
        let raw_hash = xxh3_64(text.as_bytes());

        Term {
            text,
            stream: self.stream,
            gram_size,
            idf,
            raw_hash,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn gram_size(&self) -> usize {
        self.gram_size as usize
    }

    pub fn idf(&self) -> IdfX10 {
        self.idf
    }

    pub fn raw_hash(&self) -> u64 {
        self.raw_hash
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        self.raw_hash == other.raw_hash && self.idf == other.idf && self.text == other.text
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw_hash.hash(state);
        self.idf.hash(state);
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Term")
            .field("text", &self.text)
            .field("stream", &self.stream)
            .field("gram_size", &self.gram_size)
            .field("idf", &self.idf.0)
            .field("raw_hash", &format_args!("{:016x}", self.raw_hash))
            .finish()
    }
}
