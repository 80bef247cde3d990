use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    active_alerts, fleet_stats, get_terminal, health_check, heartbeat, list_alerts,
    list_terminals, resolve_alert, transactions_chart, update_terminal, uptime_chart,
    version_chart, ws_dashboard, AppState,
};
use crate::alerts::AlertEngine;
use crate::scheduler::{OfflineSweepWorker, UptimeSweepWorker};
use crate::store::FleetStore;
use crate::telemetry::TelemetryReconciler;
use crate::ws::BroadcastHub;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub offline_sweep_interval_secs: u64,
    pub uptime_sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            offline_sweep_interval_secs: 120,
            uptime_sweep_interval_secs: 300,
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(health_check))
        // Telemetry intake
        .route("/api/heartbeat", post(heartbeat))
        // Terminal queries
        .route("/api/terminals", get(list_terminals))
        .route("/api/terminals/:id", get(get_terminal))
        .route("/api/terminals/:id", put(update_terminal))
        // Fleet aggregates
        .route("/api/stats", get(fleet_stats))
        .route("/api/charts/uptime", get(uptime_chart))
        .route("/api/charts/transactions", get(transactions_chart))
        .route("/api/charts/versions", get(version_chart))
        // Alerts
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/active", get(active_alerts))
        .route("/api/alerts/:id/resolve", post(resolve_alert))
        // Live dashboard subscriptions
        .route("/ws/dashboard", get(ws_dashboard))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(FleetStore::new());
    let hub = Arc::new(BroadcastHub::new());

    let state = Arc::new(AppState {
        reconciler: TelemetryReconciler::new(Arc::clone(&store), Arc::clone(&hub)),
        alerts: AlertEngine::new(Arc::clone(&store), Arc::clone(&hub)),
        hub: Arc::clone(&hub),
    });

    // Start background sweeps
    let offline_worker = Arc::new(OfflineSweepWorker::new(
        Arc::clone(&store),
        Arc::clone(&hub),
        Duration::from_secs(config.offline_sweep_interval_secs),
    ));
    let offline_handle = Arc::clone(&offline_worker).start();

    let uptime_worker = Arc::new(UptimeSweepWorker::new(
        Arc::clone(&store),
        Duration::from_secs(config.uptime_sweep_interval_secs),
    ));
    let uptime_handle = Arc::clone(&uptime_worker).start();

    // Build router
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting FleetPulse server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(offline_worker, uptime_worker))
        .await?;

    // Wait for workers to stop
    offline_handle.abort();
    uptime_handle.abort();

    tracing::info!("FleetPulse server stopped");
    Ok(())
}

async fn shutdown_signal(
    offline_worker: Arc<OfflineSweepWorker>,
    uptime_worker: Arc<UptimeSweepWorker>,
) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");

    tracing::info!("Shutdown signal received, stopping sweeps...");
    offline_worker.stop();
    uptime_worker.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let store = Arc::new(FleetStore::new());
        let hub = Arc::new(BroadcastHub::new());
        let state = Arc::new(AppState {
            reconciler: TelemetryReconciler::new(Arc::clone(&store), Arc::clone(&hub)),
            alerts: AlertEngine::new(Arc::clone(&store), Arc::clone(&hub)),
            hub,
        });
        build_router(state)
    }

    fn heartbeat_body(device_id: &str, battery_level: i32) -> String {
        serde_json::json!({
            "deviceId": device_id,
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "batteryLevel": battery_level,
            "batteryCharging": false,
            "networkType": "wifi",
            "storageAvailable": 8_000_000_000i64,
            "appVersion": "2.1.0",
            "osVersion": "13",
            "model": "PAX A920",
            "transactionsCount": 5
        })
        .to_string()
    }

    fn post_json(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_heartbeat_and_terminal_lookup() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(post_json("/api/heartbeat", heartbeat_body("a1b2c3d4e5f6", 85)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let terminal = body_json(response).await;
        assert_eq!(terminal["id"], "POS-a1b2c3d4");
        assert_eq!(terminal["status"], "online");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/terminals/POS-a1b2c3d4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/terminals?status=online")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listing = body_json(response).await;
        assert_eq!(listing["terminals"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_heartbeat_rejected() {
        let app = create_test_app();

        let response = app
            .oneshot(post_json("/api/heartbeat", heartbeat_body("a1b2c3d4e5f6", 101)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("batteryLevel"));
    }

    #[tokio::test]
    async fn test_terminal_not_found() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/terminals/POS-missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_status_filter_rejected() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/terminals?status=rebooting")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_terminal_location() {
        let app = create_test_app();
        app.clone()
            .oneshot(post_json("/api/heartbeat", heartbeat_body("a1b2c3d4e5f6", 85)))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/terminals/POS-a1b2c3d4")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"location":"Warehouse 3"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let terminal = body_json(response).await;
        assert_eq!(terminal["location"], "Warehouse 3");

        // empty update is a bad request
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/terminals/POS-a1b2c3d4")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_alert_lifecycle_over_http() {
        let app = create_test_app();

        // battery at 5% raises a critical alert
        app.clone()
            .oneshot(post_json("/api/heartbeat", heartbeat_body("a1b2c3d4e5f6", 5)))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/alerts/active")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        let alerts = body["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["alertType"], "BATTERY_CRITICAL");
        let id = alerts[0]["id"].as_u64().unwrap();

        let response = app
            .clone()
            .oneshot(post_json(&format!("/api/alerts/{}/resolve", id), String::new()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // resolving again reports not found
        let response = app
            .oneshot(post_json(&format!("/api/alerts/{}/resolve", id), String::new()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_and_charts() {
        let app = create_test_app();
        app.clone()
            .oneshot(post_json("/api/heartbeat", heartbeat_body("a1b2c3d4e5f6", 85)))
            .await
            .unwrap();

        for uri in [
            "/api/stats",
            "/api/charts/uptime",
            "/api/charts/transactions",
            "/api/charts/versions",
        ] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "GET {}", uri);
        }

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let stats = body_json(response).await;
        assert_eq!(stats["totalTerminals"], 1);
        assert_eq!(stats["online"], 1);
        assert_eq!(stats["totalTransactions"], 5);
    }
}
