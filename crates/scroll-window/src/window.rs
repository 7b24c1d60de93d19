use crate::gate::FetchGate;
use crate::record::{Edge, Offset};
use crate::retry::EdgeHealth;
use crate::store::ChunkStore;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WindowId(Uuid);

impl WindowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowStats {
    pub fetches: u64,
    pub merged: u64,
    pub empty_pages: u64,
    pub failures: u64,
    pub evictions: u64,
}

/// State of one attached list. Created empty, mutated only by its controller.
#[derive(Debug, Default)]
pub struct Window {
    id: WindowId,
    pub(crate) store: ChunkStore,
    pub(crate) gate: FetchGate,
    /// An empty page came back for a top request ending here.
    pub(crate) top_exhausted_through: Option<Offset>,
    /// An empty page came back for a bottom request starting here.
    pub(crate) bottom_exhausted_from: Option<Offset>,
    pub(crate) top_health: EdgeHealth,
    pub(crate) bottom_health: EdgeHealth,
    pub(crate) stats: WindowStats,
    /// Fetches started since the last user trigger.
    pub(crate) fetch_streak: usize,
    /// The fetch streak hit its cap before the viewport was covered.
    pub(crate) unsettled: bool,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn min_offset(&self) -> Option<Offset> {
        self.store.min_offset()
    }

    pub fn max_offset(&self) -> Option<Offset> {
        self.store.max_offset()
    }

    pub fn chunk_count(&self) -> usize {
        self.store.len()
    }

    pub fn is_pending(&self) -> bool {
        self.gate.is_pending()
    }

    pub fn stats(&self) -> WindowStats {
        self.stats
    }

    pub fn health(&self, edge: Edge) -> &EdgeHealth {
        match edge {
            Edge::Top => &self.top_health,
            Edge::Bottom => &self.bottom_health,
        }
    }

    pub(crate) fn health_mut(&mut self, edge: Edge) -> &mut EdgeHealth {
        match edge {
            Edge::Top => &mut self.top_health,
            Edge::Bottom => &mut self.bottom_health,
        }
    }

    /// Offset the next bottom fetch starts from, `None` once the window ends at
    /// `Offset::MAX`.
    pub fn next_bottom_offset(&self, first_offset: Offset) -> Option<Offset> {
        match self.max_offset() {
            Some(max) => max.checked_add(1),
            None => Some(first_offset),
        }
    }

    pub fn top_exhausted(&self) -> bool {
        match (self.min_offset(), self.top_exhausted_through) {
            (Some(min), Some(through)) => min <= through.saturating_add(1),
            _ => false,
        }
    }

    pub fn bottom_exhausted(&self, first_offset: Offset) -> bool {
        match self.next_bottom_offset(first_offset) {
            Some(next) => self.bottom_exhausted_from.is_some_and(|from| next >= from),
            None => true,
        }
    }

    pub(crate) fn mark_exhausted(&mut self, edge: Edge, boundary: Offset) {
        match edge {
            Edge::Top => {
                let through = self.top_exhausted_through.map_or(boundary, |t| t.max(boundary));
                self.top_exhausted_through = Some(through);
            }
            Edge::Bottom => {
                let from = self.bottom_exhausted_from.map_or(boundary, |f| f.min(boundary));
                self.bottom_exhausted_from = Some(from);
            }
        }
    }

    pub fn reset_exhaustion(&mut self) {
        self.top_exhausted_through = None;
        self.bottom_exhausted_from = None;
    }

    pub fn snapshot(&self, first_offset: Offset) -> WindowSnapshot {
        WindowSnapshot {
            id: self.id,
            min_offset: self.min_offset(),
            max_offset: self.max_offset(),
            chunks: self
                .store
                .ranges()
                .into_iter()
                .map(|range| (*range.start(), *range.end()))
                .collect(),
            pending: self.gate.is_pending(),
            top_exhausted: self.top_exhausted(),
            bottom_exhausted: self.bottom_exhausted(first_offset),
            top_faulted: self.top_health.is_faulted(),
            bottom_faulted: self.bottom_health.is_faulted(),
            busy_skips: self.gate.busy_skips(),
            unsettled: self.unsettled,
            stats: self.stats,
        }
    }
}

/// Point-in-time view of a window, cheap to clone and publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSnapshot {
    pub id: WindowId,
    pub min_offset: Option<Offset>,
    pub max_offset: Option<Offset>,
    pub chunks: Vec<(Offset, Offset)>,
    pub pending: bool,
    pub top_exhausted: bool,
    pub bottom_exhausted: bool,
    pub top_faulted: bool,
    pub bottom_faulted: bool,
    pub busy_skips: u64,
    pub unsettled: bool,
    pub stats: WindowStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::record::Record;

    fn chunk(min: Offset, max: Offset) -> Chunk {
        Chunk::new((min..=max).map(|o| Record::new(format!("Location_{o}"), o)).collect()).unwrap()
    }

    #[test]
    fn empty_window_starts_at_first_offset() {
        let window = Window::new();
        assert_eq!(window.min_offset(), None);
        assert_eq!(window.next_bottom_offset(1), Some(1));
        assert!(!window.top_exhausted());
        assert!(!window.bottom_exhausted(1));
    }

    #[test]
    fn top_exhaustion_lifts_once_the_window_moves_down() {
        let mut window = Window::new();
        window.store.push(Edge::Bottom, chunk(4, 6), 1.0).unwrap();
        window.mark_exhausted(Edge::Top, 3);
        assert!(window.top_exhausted());

        window.store.push(Edge::Bottom, chunk(7, 9), 1.0).unwrap();
        window.store.pop(Edge::Top);
        assert!(!window.top_exhausted());
    }

    #[test]
    fn bottom_exhaustion_holds_past_the_boundary() {
        let mut window = Window::new();
        window.store.push(Edge::Bottom, chunk(97, 99), 1.0).unwrap();
        window.mark_exhausted(Edge::Bottom, 100);
        assert!(window.bottom_exhausted(1));

        window.store.pop(Edge::Bottom);
        window.store.push(Edge::Bottom, chunk(94, 96), 1.0).unwrap();
        assert!(!window.bottom_exhausted(1));

        window.reset_exhaustion();
        assert!(window.bottom_exhausted_from.is_none());
    }

    #[test]
    fn window_ending_at_the_last_offset_has_no_bottom() {
        let mut window = Window::new();
        window.store.push(Edge::Bottom, chunk(Offset::MAX - 2, Offset::MAX), 1.0).unwrap();
        assert_eq!(window.next_bottom_offset(1), None);
        assert!(window.bottom_exhausted(1));

        let mut window = Window::new();
        window.store.push(Edge::Bottom, chunk(Offset::MIN, Offset::MIN + 2), 1.0).unwrap();
        window.mark_exhausted(Edge::Top, Offset::MAX);
        assert!(window.top_exhausted());
    }

    #[test]
    fn snapshot_lists_chunk_ranges() {
        let mut window = Window::new();
        window.store.push(Edge::Bottom, chunk(1, 3), 1.0).unwrap();
        window.store.push(Edge::Bottom, chunk(4, 6), 1.0).unwrap();
        let snapshot = window.snapshot(1);
        assert_eq!(snapshot.chunks, vec![(1, 3), (4, 6)]);
        assert_eq!(snapshot.min_offset, Some(1));
        assert_eq!(snapshot.max_offset, Some(6));
        assert!(!snapshot.pending);
        assert!(!snapshot.unsettled);
    }
}
