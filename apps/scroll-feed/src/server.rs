use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use scroll_window::{MemoryFeed, Offset, Record, RecordSource, metrics};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Largest page a single request may ask for.
pub const MAX_PAGE: usize = 500;

const DEFAULT_PAGE: usize = 3;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Records served, offsets `0..records`.
    pub records: Offset,
    pub latency: Duration,
}

impl ServerConfig {
    pub fn feed(&self) -> MemoryFeed {
        MemoryFeed::new(0..=self.records - 1).with_latency(self.latency)
    }
}

#[derive(Clone)]
struct AppState {
    feed: Arc<MemoryFeed>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: Offset,
    #[serde(default = "default_page")]
    pub count: usize,
}

fn default_page() -> usize {
    DEFAULT_PAGE
}

pub fn build_router(feed: MemoryFeed) -> Router {
    let state = AppState {
        feed: Arc::new(feed),
    };
    Router::new()
        .route("/records", get(records_handler))
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;
    info!(
        listen_addr = %config.listen_addr,
        records = config.records,
        latency_ms = config.latency.as_millis() as u64,
        "scroll-feed listening"
    );
    serve(listener, build_router(config.feed()), shutdown_signal()).await?;
    info!("shutdown complete");
    Ok(())
}

pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server shutdown with error")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn records_handler(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Record>>, (StatusCode, Json<serde_json::Value>)> {
    if query.count == 0 || query.count > MAX_PAGE {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("count must be between 1 and {MAX_PAGE}") })),
        ));
    }
    let page = state
        .feed
        .fetch_page(query.offset, query.count)
        .await
        .map_err(|err| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string() })),
            )
        })?;
    debug!(
        offset = query.offset,
        count = query.count,
        returned = page.len(),
        "served page"
    );
    Ok(Json(page))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
