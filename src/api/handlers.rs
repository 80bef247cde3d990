use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::alerts::AlertEngine;
use crate::store::{
    Alert, AlertFilter, HeartbeatPayload, Severity, StoreError, Terminal, TerminalStatus,
};
use crate::telemetry::{
    FleetStats, IngestError, TelemetryReconciler, TransactionPoint, UptimePoint, VersionShare,
};
use crate::ws::BroadcastHub;

/// Application state shared across handlers
pub struct AppState {
    pub reconciler: TelemetryReconciler,
    pub alerts: AlertEngine,
    pub hub: Arc<BroadcastHub>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Heartbeat Intake
// ============================================================================

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HeartbeatPayload>,
) -> Result<Json<Terminal>, ApiError> {
    let terminal = state.reconciler.ingest(&payload)?;
    Ok(Json(terminal))
}

// ============================================================================
// Terminals
// ============================================================================

#[derive(Deserialize)]
pub struct TerminalListQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct TerminalsResponse {
    pub terminals: Vec<Terminal>,
}

pub async fn list_terminals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TerminalListQuery>,
) -> Result<Json<TerminalsResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<TerminalStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    Ok(Json(TerminalsResponse {
        terminals: state.reconciler.terminals(status),
    }))
}

pub async fn get_terminal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Terminal>, ApiError> {
    state
        .reconciler
        .terminal(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("terminal '{}' not found", id)))
}

#[derive(Deserialize)]
pub struct UpdateTerminalRequest {
    pub location: Option<String>,
}

pub async fn update_terminal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTerminalRequest>,
) -> Result<Json<Terminal>, ApiError> {
    let location = request
        .location
        .ok_or_else(|| ApiError::BadRequest("no fields to update".to_string()))?;

    let terminal = state.reconciler.update_location(&id, location)?;
    Ok(Json(terminal))
}

// ============================================================================
// Fleet Aggregates
// ============================================================================

pub async fn fleet_stats(State(state): State<Arc<AppState>>) -> Json<FleetStats> {
    Json(state.reconciler.fleet_stats(chrono::Utc::now()))
}

#[derive(Serialize)]
pub struct UptimeChartResponse {
    pub points: Vec<UptimePoint>,
}

pub async fn uptime_chart(State(state): State<Arc<AppState>>) -> Json<UptimeChartResponse> {
    Json(UptimeChartResponse {
        points: state.reconciler.uptime_series(chrono::Utc::now()),
    })
}

#[derive(Serialize)]
pub struct TransactionsChartResponse {
    pub points: Vec<TransactionPoint>,
}

pub async fn transactions_chart(
    State(state): State<Arc<AppState>>,
) -> Json<TransactionsChartResponse> {
    Json(TransactionsChartResponse {
        points: state.reconciler.transactions_by_hour(chrono::Utc::now()),
    })
}

#[derive(Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<VersionShare>,
}

pub async fn version_chart(State(state): State<Arc<AppState>>) -> Json<VersionsResponse> {
    Json(VersionsResponse {
        versions: state.reconciler.version_distribution(),
    })
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Deserialize)]
pub struct AlertListQuery {
    pub severity: Option<String>,
    pub resolved: Option<bool>,
    #[serde(rename = "deviceId")]
    pub device_id: Option<String>,
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertListQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let severity = query
        .severity
        .as_deref()
        .map(str::parse::<Severity>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let filter = AlertFilter {
        severity,
        resolved: query.resolved,
        device_id: query.device_id,
    };
    Ok(Json(AlertsResponse {
        alerts: state.alerts.list(&filter),
    }))
}

pub async fn active_alerts(State(state): State<Arc<AppState>>) -> Json<AlertsResponse> {
    Json(AlertsResponse {
        alerts: state.alerts.active(),
    })
}

pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state.alerts.resolve(id)?;
    Ok(Json(alert))
}

// ============================================================================
// Live Dashboard Socket
// ============================================================================

pub async fn ws_dashboard(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Per-subscriber socket loop: hub events flow out through a forwarding
/// task; the only inbound message with semantics is the "ping" probe.
async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let session_id = Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let probe = tx.clone();
    hub.register(&session_id, tx);

    let mut forward = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if text == "ping" {
                        let _ = probe.send("pong".to_string());
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(session = %session_id, error = %e, "dashboard socket error");
                    break;
                }
            },
            _ = &mut forward => break,
        }
    }

    hub.unregister(&session_id);
    forward.abort();
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(msg) => ApiError::BadRequest(msg),
            IngestError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TerminalNotFound(_) | StoreError::AlertNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
