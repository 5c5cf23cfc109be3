//! Read-only document frequency table shared by every document built
//! under one configuration

use std::collections::HashMap;
use std::io::{self, BufRead};

use crate::error::{Result, SluiceError};

use super::term::IdfX10;

/// Maps term text to the fraction of documents containing it
#[derive(Clone, Debug, Default)]
pub struct DocumentFrequencyTable {
    frequencies: HashMap<String, f64>,
}

impl DocumentFrequencyTable {
    /// Create an empty table; every term classifies as `IdfX10::MAX`
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(text, df)` pairs
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut frequencies = HashMap::new();
        for (text, df) in entries {
            let text = text.into();
            if df.is_nan() || df <= 0.0 || df > 1.0 {
                return Err(SluiceError::InvalidFrequency { term: text, value: df });
            }
            frequencies.insert(text, df);
        }
        Ok(Self { frequencies })
    }

    /// Parse `text,df` lines, as written by the per-shard statistics
    ///
    /// The df is taken after the last comma so term text may itself
    /// contain commas. Blank lines are skipped.
    pub fn read_csv<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (text, df) = line.rsplit_once(',').ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Malformed frequency line: {:?}", line),
                )
            })?;
            let df: f64 = df.trim().parse().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Malformed frequency {:?}: {}", df, e),
                )
            })?;
            entries.push((text.to_string(), df));
        }
        Self::from_entries(entries)
    }

    pub fn lookup(&self, text: &str) -> Option<f64> {
        self.frequencies.get(text).copied()
    }

    pub fn classify(&self, text: &str) -> IdfX10 {
        self.lookup(text)
            .map(IdfX10::from_frequency)
            .unwrap_or(IdfX10::MAX)
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}
