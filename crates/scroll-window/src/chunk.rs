use crate::record::{Offset, Record};
use std::ops::RangeInclusive;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk has no records")]
    Empty,
    #[error("offset {next} follows {previous}; chunk offsets must strictly increase")]
    OutOfOrder { previous: Offset, next: Offset },
}

/// Records fetched by one request, in ascending offset order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    records: Vec<Record>,
}

impl Chunk {
    pub fn new(records: Vec<Record>) -> Result<Self, ChunkError> {
        if records.is_empty() {
            return Err(ChunkError::Empty);
        }
        for pair in records.windows(2) {
            if pair[1].offset <= pair[0].offset {
                return Err(ChunkError::OutOfOrder {
                    previous: pair[0].offset,
                    next: pair[1].offset,
                });
            }
        }
        Ok(Self { records })
    }

    pub fn min_offset(&self) -> Offset {
        self.records[0].offset
    }

    pub fn max_offset(&self) -> Offset {
        self.records[self.records.len() - 1].offset
    }

    pub fn range(&self) -> RangeInclusive<Offset> {
        self.min_offset()..=self.max_offset()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// True when the offsets have no holes, i.e. `max - min + 1 == len`. A span too
    /// wide for [`Offset`] is never dense.
    pub fn is_dense(&self) -> bool {
        self.max_offset()
            .checked_sub(self.min_offset())
            .and_then(|span| span.checked_add(1))
            .is_some_and(|span| span == self.records.len() as Offset)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}
