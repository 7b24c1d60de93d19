use crate::record::{Edge, Offset, Record};
use async_trait::async_trait;
use serde::Serialize;
use std::ops::RangeInclusive;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("record source unavailable: {0}")]
    Unavailable(String),
    #[cfg(feature = "http")]
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: u16, body: String },
}

/// Paginated read of the feed. Pages are ascending by offset and start at `offset`;
/// fewer than `count` records (or none) means the feed ends in that direction.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_page(&self, offset: Offset, count: usize) -> Result<Vec<Record>, SourceError>;
}

/// One page the controller has decided to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    pub edge: Edge,
    pub offset: Offset,
    pub count: usize,
}

impl FetchRequest {
    /// Last offset the request covers, saturating at `Offset::MAX`.
    pub fn last_offset(&self) -> Offset {
        self.offset.saturating_add(self.count as Offset - 1)
    }
}

/// Dense in-memory feed. Offsets at or past the requested one are returned, so a
/// negative offset reads from the start of the feed.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeed {
    records: Vec<Record>,
    latency: Duration,
}

impl MemoryFeed {
    /// Feed covering `range`, each record labelled `Location_<offset>`.
    pub fn new(range: RangeInclusive<Offset>) -> Self {
        let records = range
            .map(|offset| Record::new(format!("Location_{offset}"), offset))
            .collect();
        Self {
            records,
            latency: Duration::ZERO,
        }
    }

    pub fn from_records(mut records: Vec<Record>) -> Self {
        records.sort_by_key(|record| record.offset);
        records.dedup_by_key(|record| record.offset);
        Self {
            records,
            latency: Duration::ZERO,
        }
    }

    /// Delay applied to every page, to stand in for network time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn page(&self, offset: Offset, count: usize) -> Vec<Record> {
        let start = self.records.partition_point(|record| record.offset < offset);
        self.records[start..].iter().take(count).cloned().collect()
    }
}

#[async_trait]
impl RecordSource for MemoryFeed {
    async fn fetch_page(&self, offset: Offset, count: usize) -> Result<Vec<Record>, SourceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.page(offset, count))
    }
}
