use scroll_window::http::HttpRecordSource;
use scroll_window::{
    MemoryFeed, Offset, RecordSource, ScrollPort, SettleReport, SimulatedSurface, Trigger,
    WindowConfig, WindowController, WindowSnapshot,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SimulateConfig {
    pub window: WindowConfig,
    /// Records endpoint to read from; a local memory feed when unset.
    pub endpoint: Option<String>,
    pub records: Offset,
    pub latency: Duration,
    pub row_height: f64,
    pub viewport_height: f64,
    /// Pixels scrolled per step.
    pub step: f64,
    /// Steps taken in each direction.
    pub steps: usize,
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            endpoint: None,
            records: 100,
            latency: Duration::ZERO,
            row_height: 150.0,
            viewport_height: 600.0,
            step: 400.0,
            steps: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub settles: usize,
    pub fetches: usize,
    pub merged: usize,
    pub exhausted: usize,
    pub failed: usize,
    pub unsettled: usize,
}

impl Totals {
    fn add(&mut self, report: &SettleReport) {
        self.settles += 1;
        self.fetches += report.fetches;
        self.merged += report.merged;
        self.exhausted += report.exhausted;
        self.failed += report.failed;
        if !report.converged {
            self.unsettled += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    /// Lines on screen at the deepest point of the scroll.
    pub deepest: Vec<String>,
    /// Lines on screen after scrolling back up.
    pub visible: Vec<String>,
    pub totals: Totals,
    pub snapshot: WindowSnapshot,
}

pub async fn run(config: &SimulateConfig) -> Outcome {
    match &config.endpoint {
        Some(endpoint) => {
            info!(%endpoint, "simulating against records endpoint");
            drive(&HttpRecordSource::new(endpoint.clone()), config).await
        }
        None => {
            let feed = MemoryFeed::new(0..=config.records - 1).with_latency(config.latency);
            info!(records = feed.len(), "simulating against memory feed");
            drive(&feed, config).await
        }
    }
}

/// Attaches a window, scrolls down `steps` times and back up again, settling
/// after every step.
pub async fn drive<R: RecordSource + ?Sized>(source: &R, config: &SimulateConfig) -> Outcome {
    let mut controller = WindowController::new(config.window.clone());
    let mut surface = SimulatedSurface::new(config.row_height, config.viewport_height);
    let mut totals = Totals::default();

    let report = controller.settle(source, &mut surface, Trigger::Attach).await;
    totals.add(&report);
    log_step("attach", 0, &report, &controller, &surface);

    for step in 1..=config.steps {
        surface.scroll_by(config.step);
        let report = controller.settle(source, &mut surface, Trigger::Scroll).await;
        totals.add(&report);
        log_step("down", step, &report, &controller, &surface);
    }
    let deepest = surface.visible_lines();

    for step in 1..=config.steps {
        surface.scroll_by(-config.step);
        let report = controller.settle(source, &mut surface, Trigger::Scroll).await;
        totals.add(&report);
        log_step("up", step, &report, &controller, &surface);
    }

    if totals.unsettled > 0 {
        warn!(
            unsettled = totals.unsettled,
            "some steps hit the settle cap; the working set may be too small for the viewport"
        );
    }
    Outcome {
        deepest,
        visible: surface.visible_lines(),
        totals,
        snapshot: controller.snapshot(),
    }
}

fn log_step(
    phase: &'static str,
    step: usize,
    report: &SettleReport,
    controller: &WindowController,
    surface: &SimulatedSurface,
) {
    let window = controller.window();
    info!(
        phase,
        step,
        scroll_top = surface.scroll_top(),
        min_offset = ?window.min_offset(),
        max_offset = ?window.max_offset(),
        chunks = window.chunk_count(),
        fetches = report.fetches,
        converged = report.converged,
        "settled"
    );
}
