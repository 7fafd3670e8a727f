use serde::{Deserialize, Serialize};

/// Dense 0-based document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Signed distance between two documents. Addition of document IDs
    /// is intentionally not defined.
    pub fn distance(&self, other: DocId) -> i64 {
        i64::from(self.0) - i64::from(other.0)
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        DocId(id)
    }
}

/// Dense 0-based term identifier; ordered lexicographically by term string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TermId(pub u32);

impl TermId {
    pub fn new(id: u32) -> Self {
        TermId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for TermId {
    fn from(id: u32) -> Self {
        TermId(id)
    }
}

/// Shard number within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId(pub u16);

impl ShardId {
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Term-in-document count or document frequency.
pub type Frequency = u32;

/// Floating-point relevance score.
pub type Score = f32;

/// Byte offset into a posting file.
pub type Offset = u64;
