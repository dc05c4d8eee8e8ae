//! HTTP status API for the validator daemon.
//!
//! Read-only JSON views over the daemon's store: the published window
//! statistics and the epoch markers. The server either shares the running
//! daemon's store or follows a store file written by another process.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use valops_core::Store;
use valops_core::store::keys;

/// Shared server state.
pub struct AppState {
    store: Arc<Store>,
    /// Re-read the store file before every request.
    follow_file: bool,
}

impl AppState {
    pub fn new(store: Arc<Store>, follow_file: bool) -> Self {
        Self { store, follow_file }
    }

    fn refresh(&self) -> Result<(), StatusCode> {
        if !self.follow_file {
            return Ok(());
        }
        self.store.reload().map_err(|e| {
            log::warn!("store reload failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE
        })
    }
}

#[derive(Deserialize)]
pub struct StatisticsParams {
    /// Single family, e.g. `netLoadAvg`.
    name: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HealthResponse {
    status: String,
    version: String,
    families: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EpochResponse {
    markers: Value,
    is_slashing: bool,
    send_telemetry: bool,
}

async fn handle_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, StatusCode> {
    state.refresh()?;
    let families = state.store.statistics().len();
    Ok(Json(HealthResponse {
        status: if families > 0 {
            "healthy".to_string()
        } else {
            "warming_up".to_string()
        },
        version: valops_core::VERSION.to_string(),
        families,
    }))
}

async fn handle_statistics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatisticsParams>,
) -> Result<Json<Value>, StatusCode> {
    state.refresh()?;
    match params.name {
        Some(name) => state
            .store
            .statistic(&name)
            .map(Json)
            .ok_or(StatusCode::NOT_FOUND),
        None => Ok(Json(Value::Object(state.store.statistics()))),
    }
}

async fn handle_epoch(State(state): State<Arc<AppState>>) -> Result<Json<EpochResponse>, StatusCode> {
    state.refresh()?;
    let store = &state.store;
    Ok(Json(EpochResponse {
        markers: store.get(keys::EPOCH_MARKERS).unwrap_or_else(|| json!({})),
        is_slashing: store.flag(keys::IS_SLASHING),
        send_telemetry: store.flag(keys::SEND_TELEMETRY),
    }))
}

async fn handle_index() -> Json<Value> {
    Json(json!({
        "name": "valops status API",
        "version": valops_core::VERSION,
        "endpoints": {
            "/": "This API index",
            "/health": "Health check",
            "/statistics": {
                "method": "GET",
                "description": "Window averages as [1m, 5m, 15m]",
                "params": {
                    "name": "Return a single family, e.g. netLoadAvg, ppsAvg, disksLoadPercentAvg",
                }
            },
            "/epoch": "Epoch markers and runtime toggles",
        },
        "examples": {
            "network": "/statistics?name=netLoadAvg",
            "disks": "/statistics?name=disksLoadPercentAvg",
        }
    }))
}

/// Build the axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/statistics", get(handle_statistics))
        .route("/epoch", get(handle_epoch))
        .with_state(Arc::new(state))
}

/// Serve the status API until `shutdown` resolves.
pub async fn run_server(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("status API listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
