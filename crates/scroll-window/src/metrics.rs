use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static FETCH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "scroll_window_fetch_total",
            "Completed page fetches by edge and outcome",
        ),
        &["edge", "outcome"],
    )
    .expect("valid fetch counter definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static EVICTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "scroll_window_evictions_total",
            "Chunks evicted from the working set, by the edge they left from",
        ),
        &["edge"],
    )
    .expect("valid eviction counter definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static GATE_BUSY_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new(
        "scroll_window_gate_busy_total",
        "Triggers skipped because a fetch was already in flight",
    ))
    .expect("valid gate counter definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static FETCH_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new("scroll_window_fetch_seconds", "Page fetch latency")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["edge"],
    )
    .expect("valid fetch histogram definition");
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

/// Text exposition of every metric in [`REGISTRY`].
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
