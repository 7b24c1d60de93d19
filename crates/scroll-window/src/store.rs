use crate::chunk::Chunk;
use crate::record::{Edge, Offset};
use std::collections::VecDeque;
use std::ops::RangeInclusive;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("chunk {min}..={max} has gaps between its offsets")]
    Sparse { min: Offset, max: Offset },
    #[error("chunk {min}..={max} does not join the {edge} edge (expected {expected})")]
    Discontiguous {
        edge: Edge,
        min: Offset,
        max: Offset,
        expected: Offset,
    },
    #[error("no offset exists past {boundary} at the {edge} edge")]
    OffsetOverflow { edge: Edge, boundary: Offset },
}

/// A chunk together with the height its rendered unit reported on attach.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub height: f64,
}

/// Ordered chunks of one list, top to bottom. The list bounds are derived from the
/// boundary chunks, so they can never disagree with the stored data.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: VecDeque<StoredChunk>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn min_offset(&self) -> Option<Offset> {
        self.chunks.front().map(|stored| stored.chunk.min_offset())
    }

    pub fn max_offset(&self) -> Option<Offset> {
        self.chunks.back().map(|stored| stored.chunk.max_offset())
    }

    pub fn total_height(&self) -> f64 {
        self.chunks.iter().map(|stored| stored.height).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredChunk> {
        self.chunks.iter()
    }

    pub fn ranges(&self) -> Vec<RangeInclusive<Offset>> {
        self.chunks.iter().map(|stored| stored.chunk.range()).collect()
    }

    /// Checks that `chunk` may be placed at `edge` without breaking contiguity.
    pub fn check_join(&self, edge: Edge, chunk: &Chunk) -> Result<(), StoreError> {
        if !chunk.is_dense() {
            return Err(StoreError::Sparse {
                min: chunk.min_offset(),
                max: chunk.max_offset(),
            });
        }
        let (actual, boundary, expected) = match edge {
            Edge::Top => match self.min_offset() {
                Some(min) => (chunk.max_offset(), min, min.checked_sub(1)),
                None => return Ok(()),
            },
            Edge::Bottom => match self.max_offset() {
                Some(max) => (chunk.min_offset(), max, max.checked_add(1)),
                None => return Ok(()),
            },
        };
        let expected = expected.ok_or(StoreError::OffsetOverflow { edge, boundary })?;
        if actual != expected {
            return Err(StoreError::Discontiguous {
                edge,
                min: chunk.min_offset(),
                max: chunk.max_offset(),
                expected,
            });
        }
        Ok(())
    }

    pub fn push(&mut self, edge: Edge, chunk: Chunk, height: f64) -> Result<(), StoreError> {
        self.check_join(edge, &chunk)?;
        let stored = StoredChunk { chunk, height };
        match edge {
            Edge::Top => self.chunks.push_front(stored),
            Edge::Bottom => self.chunks.push_back(stored),
        }
        Ok(())
    }

    pub fn pop(&mut self, edge: Edge) -> Option<StoredChunk> {
        match edge {
            Edge::Top => self.chunks.pop_front(),
            Edge::Bottom => self.chunks.pop_back(),
        }
    }

    /// Adjacent chunks form one gap-free, non-overlapping run.
    pub fn is_contiguous(&self) -> bool {
        self.chunks.iter().all(|stored| stored.chunk.is_dense())
            && self
                .chunks
                .iter()
                .zip(self.chunks.iter().skip(1))
                .all(|(upper, lower)| {
                    upper.chunk.max_offset().checked_add(1) == Some(lower.chunk.min_offset())
                })
    }
}
