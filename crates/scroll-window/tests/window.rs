use async_trait::async_trait;
use parking_lot::Mutex;
use scroll_window::{
    Edge, MemoryFeed, Offset, Record, RecordSource, RetryPolicy, ScrollPort, SimulatedSurface,
    SourceError, Trigger, WindowConfig, WindowController, task,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Memory feed that records every request and the peak number running at once.
struct RecordingSource {
    feed: MemoryFeed,
    requests: Mutex<Vec<(Offset, usize)>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingSource {
    fn new(feed: MemoryFeed) -> Self {
        Self {
            feed,
            requests: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn requests(&self) -> Vec<(Offset, usize)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RecordSource for RecordingSource {
    async fn fetch_page(&self, offset: Offset, count: usize) -> Result<Vec<Record>, SourceError> {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        self.requests.lock().push((offset, count));
        let page = self.feed.fetch_page(offset, count).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        page
    }
}

/// Fails the first `failures` calls, then serves from the feed.
struct FlakySource {
    feed: MemoryFeed,
    failures: AtomicUsize,
}

impl FlakySource {
    fn new(feed: MemoryFeed, failures: usize) -> Self {
        Self {
            feed,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl RecordSource for FlakySource {
    async fn fetch_page(&self, offset: Offset, count: usize) -> Result<Vec<Record>, SourceError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(SourceError::Unavailable("connection reset".into()));
        }
        self.feed.fetch_page(offset, count).await
    }
}

fn assert_window_shape(controller: &WindowController) {
    let window = controller.window();
    assert!(window.store().is_contiguous(), "gap in {:?}", controller.snapshot().chunks);
    assert!(window.chunk_count() <= controller.config().max_chunks);
}

#[test_timeout::tokio_timeout_test(10)]
async fn sweeping_down_and_back_keeps_the_window_contiguous_and_bounded() {
    let feed = MemoryFeed::new(1..=100);
    let mut controller = WindowController::new(WindowConfig::default());
    let mut surface = SimulatedSurface::new(150.0, 600.0);

    let report = controller.settle(&feed, &mut surface, Trigger::Attach).await;
    assert!(report.converged);
    assert_window_shape(&controller);

    for _ in 0..20 {
        surface.scroll_by(400.0);
        let report = controller.settle(&feed, &mut surface, Trigger::Scroll).await;
        assert!(report.converged);
        assert_window_shape(&controller);
    }
    let deepest = controller.window().max_offset().unwrap();
    assert!(deepest > 30, "window only reached {deepest}");

    for _ in 0..60 {
        surface.scroll_by(-400.0);
        let report = controller.settle(&feed, &mut surface, Trigger::Scroll).await;
        assert!(report.converged);
        assert_window_shape(&controller);
    }
    assert_eq!(controller.window().min_offset(), Some(1));
    assert_eq!(surface.scroll_top(), 0.0);
    assert_eq!(surface.visible_lines()[0], "Location_1 #1");
}

#[test_timeout::tokio_timeout_test(10)]
async fn requests_never_start_below_the_first_offset() {
    let source = RecordingSource::new(MemoryFeed::new(0..=99));
    let mut controller = WindowController::new(WindowConfig {
        first_offset: 0,
        chunk_size: 4,
        ..WindowConfig::default()
    });
    let mut surface = SimulatedSurface::new(150.0, 600.0);

    controller.settle(&source, &mut surface, Trigger::Attach).await;
    for step in [900.0, 900.0, 900.0, -900.0, -900.0, -900.0, -900.0] {
        surface.scroll_by(step);
        controller.settle(&source, &mut surface, Trigger::Scroll).await;
    }

    let requests = source.requests();
    assert!(!requests.is_empty());
    assert!(requests.iter().all(|(offset, count)| *offset >= 0 && *count >= 1));
    assert_eq!(controller.window().min_offset(), Some(0));
    assert_eq!(controller.next_top_request(), None);
}

#[test_timeout::tokio_timeout_test(10)]
async fn prepending_keeps_the_visible_records_in_place() {
    let feed = MemoryFeed::new(1..=100);
    let mut controller = WindowController::new(WindowConfig::default());
    let mut surface = SimulatedSurface::new(150.0, 600.0);

    controller.settle(&feed, &mut surface, Trigger::Attach).await;
    for _ in 0..10 {
        surface.scroll_by(600.0);
        controller.settle(&feed, &mut surface, Trigger::Scroll).await;
    }
    let min_before = controller.window().min_offset().unwrap();
    assert!(min_before > 1);

    surface.set_scroll_top(100.0);
    let before = surface.visible_lines();
    let report = controller.settle(&feed, &mut surface, Trigger::Scroll).await;
    assert!(report.merged >= 1);
    assert!(controller.window().min_offset().unwrap() < min_before);
    assert_eq!(surface.visible_lines(), before);
}

#[test_timeout::tokio_timeout_test(10)]
async fn static_feed_settles_and_then_stays_quiet() {
    let source = RecordingSource::new(MemoryFeed::new(1..=100));
    let mut controller = WindowController::new(WindowConfig::default());
    let mut surface = SimulatedSurface::new(150.0, 600.0);

    let first = controller.settle(&source, &mut surface, Trigger::Attach).await;
    assert!(first.converged);
    assert!(first.fetches > 0);

    let again = controller.settle(&source, &mut surface, Trigger::Resize).await;
    assert!(again.converged);
    assert_eq!(again.fetches, 0);
    assert_eq!(source.requests().len(), first.fetches);
}

#[test_timeout::tokio_timeout_test(10)]
async fn short_feed_exhausts_the_bottom_edge() {
    let source = RecordingSource::new(MemoryFeed::new(1..=10));
    let mut controller = WindowController::new(WindowConfig::default());
    let mut surface = SimulatedSurface::new(10.0, 10_000.0);

    let report = controller.settle(&source, &mut surface, Trigger::Attach).await;
    assert!(report.converged);
    assert_eq!(report.exhausted, 1);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.chunks, vec![(1, 3), (4, 6), (7, 9), (10, 10)]);
    assert!(snapshot.bottom_exhausted);
    assert_eq!(source.requests().last(), Some(&(11, 3)));

    let report = controller.settle(&source, &mut surface, Trigger::Scroll).await;
    assert_eq!(report.fetches, 0);
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn transient_failures_back_off_and_recover() {
    let source = FlakySource::new(MemoryFeed::new(1..=100), 2);
    let mut controller = WindowController::new(WindowConfig::default());
    let mut surface = SimulatedSurface::new(150.0, 600.0);
    let start = Instant::now();

    let report = controller.settle(&source, &mut surface, Trigger::Attach).await;
    assert!(report.converged);
    assert_eq!(report.failed, 2);
    assert_eq!(report.merged, 2);
    assert!(start.elapsed() >= Duration::from_millis(250 + 500));
    assert_eq!(controller.window().health(Edge::Bottom).failures(), 0);
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn persistent_failures_fault_the_edge_until_the_user_scrolls() {
    let source = FlakySource::new(MemoryFeed::new(1..=100), usize::MAX);
    let mut controller = WindowController::new(WindowConfig::default());
    let mut surface = SimulatedSurface::new(150.0, 600.0);

    let report = controller.settle(&source, &mut surface, Trigger::Attach).await;
    assert_eq!(report.failed, 5);
    assert!(controller.snapshot().bottom_faulted);

    let report = controller.settle(&source, &mut surface, Trigger::Completion).await;
    assert_eq!(report.fetches, 0);

    let report = controller.settle(&source, &mut surface, Trigger::Scroll).await;
    assert_eq!(report.fetches, 1);
    assert_eq!(report.failed, 1);
    assert!(controller.snapshot().bottom_faulted);
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn slow_pages_time_out_as_failures() {
    let feed = MemoryFeed::new(1..=100).with_latency(Duration::from_secs(30));
    let mut controller = WindowController::new(WindowConfig {
        fetch_timeout_ms: 100,
        retry: RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        },
        ..WindowConfig::default()
    });
    let mut surface = SimulatedSurface::new(150.0, 600.0);

    let report = controller.settle(&feed, &mut surface, Trigger::Attach).await;
    assert_eq!(report.failed, 1);
    assert_eq!(controller.window().chunk_count(), 0);
    assert!(controller.snapshot().bottom_faulted);
    assert!(!controller.window().is_pending());
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn window_task_keeps_one_fetch_in_flight() {
    let source = Arc::new(RecordingSource::new(
        MemoryFeed::new(1..=100).with_latency(Duration::from_millis(50)),
    ));
    let surface = Arc::new(Mutex::new(SimulatedSurface::new(150.0, 600.0)));
    let handle = task::attach(WindowConfig::default(), Arc::clone(&source), Arc::clone(&surface));

    for _ in 0..10 {
        assert!(handle.trigger(Trigger::Scroll));
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    surface.lock().scroll_by(2_000.0);
    handle.trigger(Trigger::Scroll);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = handle.detach().await.unwrap();
    assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    assert!(snapshot.busy_skips >= 1);
    assert!(snapshot.max_offset.unwrap() > 6);
    assert!(snapshot.chunks.len() <= 4);
}
