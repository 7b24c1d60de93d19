use crate::chunk::{Chunk, ChunkError};
use crate::compensator::{Adjustment, LayoutChange, ScrollAnchor, ScrollCompensator};
use crate::config::WindowConfig;
use crate::metrics;
use crate::record::{Edge, Offset, Record};
use crate::render::Surface;
use crate::retry::Readiness;
use crate::source::{FetchRequest, RecordSource, SourceError};
use crate::store::StoreError;
use crate::viewport::{Geometry, ViewportMonitor};
use crate::window::{Window, WindowSnapshot};
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Why the controller is being asked to look at the viewport again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Attach,
    Scroll,
    Resize,
    /// A fetch just finished.
    Completion,
    /// A backoff deadline passed.
    Retry,
}

impl Trigger {
    /// Host-originated triggers; these revive faulted edges.
    pub fn is_user(self) -> bool {
        matches!(self, Trigger::Attach | Trigger::Scroll | Trigger::Resize)
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// The gate was taken; the caller must run the fetch and hand the result to
    /// [`WindowController::complete`].
    Fetch(FetchRequest),
    Idle,
    /// A fetch is already in flight.
    Busy,
    /// A needed edge is backing off until the given instant.
    Waiting(Instant),
    /// `max_settle_steps` fetches ran since the last user trigger and the
    /// viewport still wants more; nothing is loaded until the user acts.
    Stalled,
}

#[derive(thiserror::Error, Debug)]
pub enum FetchFailure {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("fetch timed out after {0:?}")]
    TimedOut(Duration),
    #[error("page rejected: {0}")]
    Malformed(#[from] ChunkError),
    #[error("page rejected: {0}")]
    Misplaced(#[from] StoreError),
    #[error("page rejected: {got} records returned for a request of {requested}")]
    Oversized { requested: usize, got: usize },
}

#[derive(Debug)]
pub enum Completion {
    Merged {
        edge: Edge,
        range: RangeInclusive<Offset>,
        height: f64,
        evicted: Option<RangeInclusive<Offset>>,
        adjustment: Adjustment,
    },
    /// Empty page; the edge stops loading until the window moves away from it.
    Exhausted { edge: Edge, boundary: Offset },
    Failed {
        edge: Edge,
        failure: FetchFailure,
        retry_in: Duration,
        faulted: bool,
    },
}

impl Completion {
    pub fn edge(&self) -> Edge {
        match self {
            Completion::Merged { edge, .. }
            | Completion::Exhausted { edge, .. }
            | Completion::Failed { edge, .. } => *edge,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SettleReport {
    pub fetches: usize,
    pub merged: usize,
    pub exhausted: usize,
    pub failed: usize,
    /// False when the window stalled at the step cap or a foreign fetch held the gate.
    pub converged: bool,
}

/// Owns one [`Window`] and runs the check/fetch/merge cycle against it.
#[derive(Debug)]
pub struct WindowController {
    config: WindowConfig,
    monitor: ViewportMonitor,
    compensator: ScrollCompensator,
    window: Window,
}

impl WindowController {
    pub fn new(config: WindowConfig) -> Self {
        let monitor = config.monitor();
        Self {
            config,
            monitor,
            compensator: ScrollCompensator,
            window: Window::new(),
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        self.window.snapshot(self.config.first_offset)
    }

    /// Forgets both exhaustion marks, for feeds that grow after attach.
    pub fn reset_exhaustion(&mut self) {
        self.window.reset_exhaustion();
        debug!(
            target = "scroll_window::controller",
            window = %self.window.id(),
            "exhaustion marks cleared"
        );
    }

    /// Records directly above the window, clamped at `first_offset`.
    pub fn next_top_request(&self) -> Option<FetchRequest> {
        let min = self.window.min_offset()?;
        let first = self.config.first_offset;
        if min <= first || self.window.top_exhausted() {
            return None;
        }
        let offset = min.saturating_sub(self.config.chunk_size as Offset).max(first);
        Some(FetchRequest {
            edge: Edge::Top,
            offset,
            count: (min - offset) as usize,
        })
    }

    pub fn next_bottom_request(&self) -> Option<FetchRequest> {
        if self.window.bottom_exhausted(self.config.first_offset) {
            return None;
        }
        Some(FetchRequest {
            edge: Edge::Bottom,
            offset: self.window.next_bottom_offset(self.config.first_offset)?,
            count: self.config.chunk_size,
        })
    }

    /// Decides what to load next. On [`Plan::Fetch`] the gate is held until
    /// [`complete`](Self::complete) is called with the same request.
    pub fn plan(&mut self, trigger: Trigger, geometry: &Geometry, now: Instant) -> Plan {
        if trigger.is_user() {
            self.window.fetch_streak = 0;
            self.window.unsettled = false;
            for edge in [Edge::Top, Edge::Bottom] {
                if self.window.health_mut(edge).revive() {
                    debug!(
                        target = "scroll_window::controller",
                        window = %self.window.id(),
                        %edge,
                        ?trigger,
                        "faulted edge revived"
                    );
                }
            }
        }

        let needs = self.monitor.needs_more(geometry);
        trace!(
            target = "scroll_window::controller",
            window = %self.window.id(),
            ?trigger,
            top = needs.top,
            bottom = needs.bottom,
            "viewport checked"
        );
        let top = needs.top.then(|| self.next_top_request()).flatten();
        let bottom = needs.bottom.then(|| self.next_bottom_request()).flatten();

        let mut wake: Option<Instant> = None;
        for request in [top, bottom].into_iter().flatten() {
            match self.window.health(request.edge).readiness(now) {
                Readiness::Ready => return self.begin(request, trigger),
                Readiness::CoolingDown(at) => {
                    wake = Some(wake.map_or(at, |current| current.min(at)));
                }
                Readiness::Faulted => {}
            }
        }
        match wake {
            Some(at) => Plan::Waiting(at),
            None => Plan::Idle,
        }
    }

    fn begin(&mut self, request: FetchRequest, trigger: Trigger) -> Plan {
        if !trigger.is_user() && self.window.fetch_streak >= self.config.max_settle_steps {
            if !self.window.unsettled {
                self.window.unsettled = true;
                warn!(
                    target = "scroll_window::controller",
                    window = %self.window.id(),
                    fetches = self.window.fetch_streak,
                    edge = %request.edge,
                    "window did not settle; the working set may be smaller than the viewport and buffers"
                );
            }
            return Plan::Stalled;
        }
        if !self.window.gate.try_begin() {
            metrics::GATE_BUSY_TOTAL.inc();
            trace!(
                target = "scroll_window::controller",
                window = %self.window.id(),
                edge = %request.edge,
                "fetch already in flight; skipped"
            );
            return Plan::Busy;
        }
        self.window.stats.fetches += 1;
        self.window.fetch_streak += 1;
        debug!(
            target = "scroll_window::controller",
            window = %self.window.id(),
            edge = %request.edge,
            offset = request.offset,
            count = request.count,
            "fetch started"
        );
        Plan::Fetch(request)
    }

    /// Applies the result of the fetch `request` and releases the gate.
    pub fn complete<S: Surface + ?Sized>(
        &mut self,
        request: FetchRequest,
        result: Result<Vec<Record>, FetchFailure>,
        surface: &mut S,
        now: Instant,
    ) -> Completion {
        self.window.gate.end();
        match result.and_then(|records| self.validate(&request, records)) {
            Ok(None) => self.exhausted(request),
            Ok(Some(chunk)) => {
                let anchor = self.compensator.anchor(surface);
                let range = chunk.range();
                let height = surface.attach(request.edge, &chunk);
                match self.window.store.push(request.edge, chunk, height) {
                    Ok(()) => self.merged(request, range, height, anchor, surface),
                    Err(err) => {
                        surface.detach(request.edge);
                        self.failed(request, err.into(), now)
                    }
                }
            }
            Err(failure) => self.failed(request, failure, now),
        }
    }

    /// Releases the gate without applying the page. Used when the window is being
    /// detached while `request` was in flight.
    pub fn discard(&mut self, request: FetchRequest) {
        self.window.gate.end();
        debug!(
            target = "scroll_window::controller",
            window = %self.window.id(),
            edge = %request.edge,
            offset = request.offset,
            "fetch result discarded"
        );
    }

    /// Turns a page into a chunk that joins the window at the request's edge, or
    /// `None` for an empty page.
    fn validate(
        &self,
        request: &FetchRequest,
        mut records: Vec<Record>,
    ) -> Result<Option<Chunk>, FetchFailure> {
        if records.len() > request.count {
            return Err(FetchFailure::Oversized {
                requested: request.count,
                got: records.len(),
            });
        }
        if request.edge == Edge::Top {
            // Sources page forward, so near the start of the feed a top page can run
            // into records the window already holds.
            let last = request.last_offset();
            records.retain(|record| record.offset <= last);
        }
        if records.is_empty() {
            return Ok(None);
        }
        let chunk = Chunk::new(records)?;
        self.window.store.check_join(request.edge, &chunk)?;
        Ok(Some(chunk))
    }

    fn merged<S: Surface + ?Sized>(
        &mut self,
        request: FetchRequest,
        range: RangeInclusive<Offset>,
        height: f64,
        anchor: ScrollAnchor,
        surface: &mut S,
    ) -> Completion {
        let edge = request.edge;
        let mut adjustment = match edge {
            Edge::Top => self
                .compensator
                .compensate(surface, anchor, LayoutChange::Prepended(height)),
            Edge::Bottom => self
                .compensator
                .compensate(surface, anchor, LayoutChange::Appended(height)),
        };

        let mut evicted = None;
        if self.window.store.len() > self.config.max_chunks {
            let far = edge.opposite();
            if let Some(stored) = self.window.store.pop(far) {
                surface.detach(far);
                let change = match far {
                    Edge::Top => LayoutChange::EvictedFront(stored.height),
                    Edge::Bottom => LayoutChange::EvictedBack(stored.height),
                };
                if far == Edge::Top {
                    adjustment = self.compensator.compensate(surface, anchor, change);
                }
                metrics::EVICTIONS_TOTAL.with_label_values(&[far.as_str()]).inc();
                self.window.stats.evictions += 1;
                debug!(
                    target = "scroll_window::controller",
                    window = %self.window.id(),
                    edge = %far,
                    min = stored.chunk.min_offset(),
                    max = stored.chunk.max_offset(),
                    height = stored.height,
                    "chunk evicted"
                );
                evicted = Some(stored.chunk.range());
            }
        }

        self.window.health_mut(edge).record_success();
        self.window.stats.merged += 1;
        metrics::FETCH_TOTAL
            .with_label_values(&[edge.as_str(), "merged"])
            .inc();
        debug!(
            target = "scroll_window::controller",
            window = %self.window.id(),
            %edge,
            min = range.start(),
            max = range.end(),
            height,
            scroll_before = adjustment.before,
            scroll_after = adjustment.after,
            chunks = self.window.store.len(),
            "chunk merged"
        );
        Completion::Merged {
            edge,
            range,
            height,
            evicted,
            adjustment,
        }
    }

    fn exhausted(&mut self, request: FetchRequest) -> Completion {
        let edge = request.edge;
        let boundary = match edge {
            Edge::Top => request.last_offset(),
            Edge::Bottom => request.offset,
        };
        self.window.mark_exhausted(edge, boundary);
        self.window.health_mut(edge).record_success();
        self.window.stats.empty_pages += 1;
        metrics::FETCH_TOTAL
            .with_label_values(&[edge.as_str(), "empty"])
            .inc();
        debug!(
            target = "scroll_window::controller",
            window = %self.window.id(),
            %edge,
            boundary,
            "empty page; edge exhausted"
        );
        Completion::Exhausted { edge, boundary }
    }

    fn failed(&mut self, request: FetchRequest, failure: FetchFailure, now: Instant) -> Completion {
        let edge = request.edge;
        let health = self.window.health_mut(edge);
        let retry_in = health.record_failure(&self.config.retry, now);
        let faulted = health.is_faulted();
        let failures = health.failures();
        self.window.stats.failures += 1;
        metrics::FETCH_TOTAL
            .with_label_values(&[edge.as_str(), "failed"])
            .inc();
        warn!(
            target = "scroll_window::controller",
            window = %self.window.id(),
            %edge,
            offset = request.offset,
            count = request.count,
            failures,
            retry_in_ms = retry_in.as_millis() as u64,
            error = %failure,
            "fetch failed"
        );
        if faulted {
            warn!(
                target = "scroll_window::controller",
                window = %self.window.id(),
                %edge,
                failures,
                "edge faulted; waiting for user input before retrying"
            );
        }
        Completion::Failed {
            edge,
            failure,
            retry_in,
            faulted,
        }
    }

    /// Runs check/fetch/merge until nothing is needed, every needed edge is
    /// exhausted or faulted, or the window stalls after `max_settle_steps`
    /// fetches. Backoff deadlines are slept through.
    pub async fn settle<R, S>(&mut self, source: &R, surface: &mut S, trigger: Trigger) -> SettleReport
    where
        R: RecordSource + ?Sized,
        S: Surface + ?Sized,
    {
        let mut report = SettleReport::default();
        let mut trigger = trigger;
        let timeout = self.config.fetch_timeout();
        loop {
            let geometry = surface.geometry();
            match self.plan(trigger, &geometry, Instant::now()) {
                Plan::Fetch(request) => {
                    report.fetches += 1;
                    let result = fetch_with_timeout(source, request, timeout).await;
                    match self.complete(request, result, surface, Instant::now()) {
                        Completion::Merged { .. } => report.merged += 1,
                        Completion::Exhausted { .. } => report.exhausted += 1,
                        Completion::Failed { .. } => report.failed += 1,
                    }
                    trigger = Trigger::Completion;
                }
                Plan::Idle => {
                    report.converged = true;
                    return report;
                }
                Plan::Busy | Plan::Stalled => return report,
                Plan::Waiting(until) => {
                    trace!(
                        target = "scroll_window::controller",
                        window = %self.window.id(),
                        "sleeping until backoff expires"
                    );
                    tokio::time::sleep_until(until).await;
                    trigger = Trigger::Retry;
                }
            }
        }
    }
}

/// Runs one page request under `timeout`, recording its latency.
pub(crate) async fn fetch_with_timeout<R: RecordSource + ?Sized>(
    source: &R,
    request: FetchRequest,
    timeout: Duration,
) -> Result<Vec<Record>, FetchFailure> {
    let timer = metrics::FETCH_SECONDS
        .with_label_values(&[request.edge.as_str()])
        .start_timer();
    let result = tokio::time::timeout(timeout, source.fetch_page(request.offset, request.count)).await;
    timer.observe_duration();
    match result {
        Ok(page) => page.map_err(FetchFailure::from),
        Err(_) => Err(FetchFailure::TimedOut(timeout)),
    }
}
