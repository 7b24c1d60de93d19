//! Event-driven window driver.
//!
//! The host forwards scroll/resize events as [`Trigger`]s; the task owns the
//! [`WindowController`], keeps at most one fetch in flight, re-checks after every
//! completion and sleeps through backoff deadlines. Completion-driven fetches stop
//! at `max_settle_steps` until the next user trigger. The latest
//! [`WindowSnapshot`] is published on a watch channel.

use crate::config::WindowConfig;
use crate::controller::{FetchFailure, Plan, Trigger, WindowController, fetch_with_timeout};
use crate::record::Record;
use crate::render::Surface;
use crate::source::{FetchRequest, RecordSource};
use crate::window::{WindowId, WindowSnapshot};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, trace};

const TRIGGER_BUFFER: usize = 64;

type InFlight = (FetchRequest, BoxFuture<'static, Result<Vec<Record>, FetchFailure>>);

pub struct WindowHandle {
    id: WindowId,
    triggers: mpsc::Sender<Trigger>,
    snapshots: watch::Receiver<WindowSnapshot>,
    join: JoinHandle<WindowSnapshot>,
}

impl WindowHandle {
    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Queues a re-check. Returns false if the queue is full or the task is gone;
    /// a dropped trigger loses nothing while a fetch is in flight, since its
    /// completion re-checks anyway.
    pub fn trigger(&self, trigger: Trigger) -> bool {
        match self.triggers.try_send(trigger) {
            Ok(()) => true,
            Err(err) => {
                trace!(
                    target = "scroll_window::task",
                    window = %self.id,
                    ?trigger,
                    error = %err,
                    "trigger dropped"
                );
                false
            }
        }
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WindowSnapshot> {
        self.snapshots.clone()
    }

    /// Stops accepting triggers, waits for any in-flight fetch (its page is not
    /// applied) and returns the final state.
    pub async fn detach(self) -> Result<WindowSnapshot, JoinError> {
        let WindowHandle { id, triggers, join, .. } = self;
        drop(triggers);
        let snapshot = join.await?;
        debug!(target = "scroll_window::task", window = %id, "window detached");
        Ok(snapshot)
    }
}

/// Spawns the driver for a new window and runs the attach check immediately.
pub fn attach<R, S>(config: WindowConfig, source: Arc<R>, surface: Arc<Mutex<S>>) -> WindowHandle
where
    R: RecordSource + 'static,
    S: Surface + Send + 'static,
{
    let controller = WindowController::new(config);
    let id = controller.window().id();
    let (triggers, rx) = mpsc::channel(TRIGGER_BUFFER);
    let (publish, snapshots) = watch::channel(controller.snapshot());
    let join = tokio::spawn(run(controller, source, surface, rx, publish));
    debug!(target = "scroll_window::task", window = %id, "window attached");
    WindowHandle {
        id,
        triggers,
        snapshots,
        join,
    }
}

async fn run<R, S>(
    mut controller: WindowController,
    source: Arc<R>,
    surface: Arc<Mutex<S>>,
    mut rx: mpsc::Receiver<Trigger>,
    publish: watch::Sender<WindowSnapshot>,
) -> WindowSnapshot
where
    R: RecordSource + 'static,
    S: Surface + Send + 'static,
{
    let timeout = controller.config().fetch_timeout();
    let mut inflight: Option<InFlight> = None;
    let mut wake: Option<Instant> = None;
    let mut next = Some(Trigger::Attach);
    let mut open = true;

    loop {
        if let Some(trigger) = next.take() {
            let geometry = surface.lock().geometry();
            match controller.plan(trigger, &geometry, Instant::now()) {
                Plan::Fetch(request) => {
                    wake = None;
                    let source = Arc::clone(&source);
                    let fetch = async move { fetch_with_timeout(&*source, request, timeout).await };
                    inflight = Some((request, fetch.boxed()));
                }
                Plan::Waiting(at) => wake = Some(at),
                Plan::Idle | Plan::Stalled => wake = None,
                Plan::Busy => {}
            }
            publish.send_replace(controller.snapshot());
        }

        if !open && inflight.is_none() {
            break;
        }

        tokio::select! {
            (request, result) = in_flight(&mut inflight), if inflight.is_some() => {
                inflight = None;
                if open {
                    let mut surface = surface.lock();
                    controller.complete(request, result, &mut *surface, Instant::now());
                    next = Some(Trigger::Completion);
                } else {
                    controller.discard(request);
                }
                publish.send_replace(controller.snapshot());
            }
            _ = sleep_until(wake), if open && wake.is_some() => {
                wake = None;
                next = Some(Trigger::Retry);
            }
            received = rx.recv(), if open => match received {
                Some(trigger) => next = Some(trigger),
                None => open = false,
            },
        }
    }

    let snapshot = controller.snapshot();
    publish.send_replace(snapshot.clone());
    snapshot
}

async fn in_flight(slot: &mut Option<InFlight>) -> (FetchRequest, Result<Vec<Record>, FetchFailure>) {
    match slot {
        Some((request, fetch)) => (*request, fetch.await),
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Offset;
    use crate::render::SimulatedSurface;
    use crate::source::{MemoryFeed, SourceError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FlakySource {
        feed: MemoryFeed,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl RecordSource for FlakySource {
        async fn fetch_page(&self, offset: Offset, count: usize) -> Result<Vec<Record>, SourceError> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                return Err(SourceError::Unavailable("connection reset".into()));
            }
            self.feed.fetch_page(offset, count).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn attach_fills_the_viewport() {
        let feed = Arc::new(MemoryFeed::new(1..=100).with_latency(Duration::from_millis(20)));
        let surface = Arc::new(Mutex::new(SimulatedSurface::new(150.0, 600.0)));
        let handle = attach(WindowConfig::default(), feed, Arc::clone(&surface));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.chunks, vec![(1, 3), (4, 6)]);
        assert!(!snapshot.pending);
        assert_eq!(surface.lock().unit_count(), 2);

        let last = handle.detach().await.unwrap();
        assert_eq!(last.chunks, snapshot.chunks);
    }

    #[tokio::test(start_paused = true)]
    async fn detach_discards_the_in_flight_page() {
        let feed = Arc::new(MemoryFeed::new(1..=100).with_latency(Duration::from_millis(500)));
        let surface = Arc::new(Mutex::new(SimulatedSurface::new(150.0, 600.0)));
        let handle = attach(WindowConfig::default(), feed, Arc::clone(&surface));

        tokio::task::yield_now().await;
        assert!(handle.snapshot().pending);
        let last = handle.detach().await.unwrap();
        assert!(!last.pending);
        assert!(last.chunks.is_empty());
        assert_eq!(surface.lock().unit_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_deadline_retries_until_the_window_fills() {
        let source = Arc::new(FlakySource {
            feed: MemoryFeed::new(1..=100),
            failures_left: AtomicUsize::new(2),
        });
        let surface = Arc::new(Mutex::new(SimulatedSurface::new(150.0, 600.0)));
        let handle = attach(WindowConfig::default(), source, Arc::clone(&surface));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let waiting = handle.snapshot();
        assert_eq!(waiting.stats.failures, 1);
        assert_eq!(waiting.stats.fetches, 1);
        assert!(waiting.chunks.is_empty());
        assert!(!waiting.pending);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.chunks, vec![(1, 3), (4, 6)]);
        assert_eq!(snapshot.stats.failures, 2);
        assert_eq!(snapshot.stats.fetches, 4);
        assert!(!snapshot.bottom_faulted);
        assert_eq!(surface.lock().unit_count(), 2);
        handle.detach().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn completion_fetches_stop_at_the_step_cap() {
        let feed = Arc::new(MemoryFeed::new(1..=100).with_latency(Duration::from_millis(10)));
        let surface = Arc::new(Mutex::new(SimulatedSurface::new(10.0, 10_000.0)));
        let config = WindowConfig {
            max_settle_steps: 8,
            ..WindowConfig::default()
        };
        let handle = attach(config, feed, Arc::clone(&surface));

        tokio::time::sleep(Duration::from_secs(60)).await;
        let stalled = handle.snapshot();
        assert_eq!(stalled.stats.fetches, 8);
        assert!(stalled.unsettled);
        assert!(!stalled.pending);
        assert!(stalled.chunks.len() <= 4);

        assert!(handle.trigger(Trigger::Scroll));
        tokio::time::sleep(Duration::from_secs(60)).await;
        let again = handle.snapshot();
        assert_eq!(again.stats.fetches, 16);
        assert!(again.unsettled);
        handle.detach().await.unwrap();
    }
}
