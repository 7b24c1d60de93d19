//! Chunked windowing controller for bidirectional infinite scroll.
//!
//! A list attached to a [`WindowController`] keeps a bounded, contiguous run of
//! fetched chunks. Viewport geometry decides which edge needs data, a fetch gate
//! keeps at most one request in flight, and every merge or eviction is paired with
//! a scroll adjustment so the records under the viewport do not move.
//!
//! Responsibilities:
//! - deciding from geometry whether the top or bottom needs more records
//! - tracking contiguous offsets and evicting chunks beyond the working set
//! - single-flight fetching with timeout, backoff and exhaustion tracking
//! - driving the check loop either synchronously ([`WindowController::settle`])
//!   or as an event-driven task ([`task::attach`])

pub mod chunk;
pub mod compensator;
pub mod config;
pub mod controller;
pub mod gate;
#[cfg(feature = "http")]
pub mod http;
pub mod metrics;
pub mod record;
pub mod render;
pub mod retry;
pub mod source;
pub mod store;
pub mod task;
pub mod viewport;
pub mod window;

pub use chunk::{Chunk, ChunkError};
pub use compensator::{Adjustment, LayoutChange, ScrollAnchor, ScrollCompensator};
pub use config::{ConfigError, WindowConfig};
pub use controller::{Completion, FetchFailure, Plan, SettleReport, Trigger, WindowController};
pub use gate::FetchGate;
pub use record::{Edge, Offset, Record};
pub use render::{RenderAdapter, ScrollPort, SimulatedSurface, Surface};
pub use retry::{EdgeHealth, Readiness, RetryPolicy};
pub use source::{FetchRequest, MemoryFeed, RecordSource, SourceError};
pub use store::{ChunkStore, StoreError, StoredChunk};
pub use task::WindowHandle;
pub use viewport::{Geometry, Needs, ViewportMonitor};
pub use window::{Window, WindowId, WindowSnapshot, WindowStats};
