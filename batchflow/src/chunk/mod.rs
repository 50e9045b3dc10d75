//! Chunks and the chunk-oriented processing loop.

mod orchestrator;

pub use orchestrator::ChunkOrchestrator;

use serde::{Deserialize, Serialize};
use std::fmt;

/// An item together with its 1-based position in the source sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkItem<I> {
    /// Position in the source sequence. Skipped records keep their position.
    pub ordinal: u64,
    /// The item.
    pub item: I,
}

impl<I> ChunkItem<I> {
    /// Creates a new chunk item.
    pub fn new(ordinal: u64, item: I) -> Self {
        Self { ordinal, item }
    }
}

/// An ordered group of items processed under one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<I> {
    items: Vec<ChunkItem<I>>,
    is_final: bool,
}

impl<I> Chunk<I> {
    /// Creates an empty chunk with room for `capacity` items.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            is_final: false,
        }
    }

    /// Appends an item.
    pub fn push(&mut self, item: ChunkItem<I>) {
        self.items.push(item);
    }

    /// Marks this chunk as the last one: the source is exhausted.
    pub fn mark_final(&mut self) {
        self.is_final = true;
    }

    /// Returns true if the source was exhausted while filling this chunk.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the chunk holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The items in source order.
    #[must_use]
    pub fn items(&self) -> &[ChunkItem<I>] {
        &self.items
    }

    /// Consumes the chunk, returning its items.
    #[must_use]
    pub fn into_items(self) -> Vec<ChunkItem<I>> {
        self.items
    }

    /// Ordinals of the first and last item.
    #[must_use]
    pub fn ordinal_range(&self) -> Option<(u64, u64)> {
        Some((self.items.first()?.ordinal, self.items.last()?.ordinal))
    }
}

/// Where the orchestrator is in processing the current chunk.
///
/// ```text
/// Reading -> Transforming -> Writing -> Committed
///                 |             |
///                 +-------------+--> RolledBack -> Isolating -> Resumed | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    /// Filling the chunk from the source.
    #[default]
    Reading,
    /// Transforming the chunk's items.
    Transforming,
    /// Writing the chunk's outputs.
    Writing,
    /// The chunk transaction committed.
    Committed,
    /// The chunk transaction rolled back.
    RolledBack,
    /// Reprocessing the chunk one item per transaction.
    Isolating,
    /// Isolation finished; processing continues with the next chunk.
    Resumed,
    /// The step failed on this chunk.
    Failed,
}

impl ChunkState {
    /// Returns true once the chunk needs no further work.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Resumed | Self::Failed)
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reading => "reading",
            Self::Transforming => "transforming",
            Self::Writing => "writing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Isolating => "isolating",
            Self::Resumed => "resumed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_basics() {
        let mut chunk = Chunk::with_capacity(3);
        assert!(chunk.is_empty());
        assert_eq!(chunk.ordinal_range(), None);

        chunk.push(ChunkItem::new(4, "d"));
        chunk.push(ChunkItem::new(6, "f"));
        chunk.mark_final();

        assert_eq!(chunk.len(), 2);
        assert!(chunk.is_final());
        assert_eq!(chunk.ordinal_range(), Some((4, 6)));
        assert_eq!(chunk.into_items()[1].item, "f");
    }

    #[test]
    fn test_chunk_state() {
        assert!(ChunkState::Committed.is_terminal());
        assert!(!ChunkState::Isolating.is_terminal());
        assert_eq!(ChunkState::RolledBack.to_string(), "rolled_back");
    }
}
