//! Core types for the ingestion index

use serde::{Deserialize, Serialize};
use std::fmt;

/// External document identifier, unique among live documents
pub type DocId = u64;

/// Identifier of a sealed batch of documents
pub type GroupId = u64;

/// Shard identifier (position in the shard definition)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId(pub u16);

impl ShardId {
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard_{}", self.0)
    }
}

/// Handle of a fact registered in a `FactSet`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactHandle(pub u8);

impl FactHandle {
    pub fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fact_{}", self.0)
    }
}

/// Where a document's row lives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentLocation {
    pub shard: ShardId,
    pub slice: u32,
    /// Offset of the row within its slice
    pub row: u32,
}

impl DocumentLocation {
    pub fn new(shard: ShardId, slice: u32, row: u32) -> Self {
        Self { shard, slice, row }
    }
}

impl fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/slice_{}/row_{}", self.shard, self.slice, self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let location = DocumentLocation::new(ShardId::new(2), 5, 17);
        assert_eq!(location.to_string(), "shard_2/slice_5/row_17");
        assert_eq!(FactHandle::new(3).to_string(), "fact_3");
    }
}
