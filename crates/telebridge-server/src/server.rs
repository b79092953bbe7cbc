//! `BridgeServer`: axum HTTP + WebSocket server for viewers.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::Value;
use telebridge_core::{Snapshot, TelemetryStore};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::{CommandDispatcher, DeviceSink};
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::BroadcastHub;
use crate::websocket::session::{self, HeartbeatConfig};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Telemetry state served by `/snapshot`.
    pub store: Arc<TelemetryStore>,
    /// Viewer fan-out.
    pub hub: Arc<BroadcastHub>,
    /// Command path to the device.
    pub dispatcher: Arc<CommandDispatcher>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Viewer heartbeat timing.
    pub heartbeat: HeartbeatConfig,
    /// When the server started.
    pub start_time: Instant,
}

/// Body of every `/send_command` response.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    /// `"success"` or `"error"`.
    pub status: &'static str,
    /// Human-readable outcome.
    pub message: String,
}

impl CommandResponse {
    fn success() -> Self {
        Self {
            status: "success",
            message: "command sent".into(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: "error",
            message,
        }
    }
}

/// The viewer-facing server.
pub struct BridgeServer {
    config: ServerConfig,
    state: AppState,
}

impl BridgeServer {
    /// Create a server over shared bridge state.
    pub fn new(
        config: ServerConfig,
        store: Arc<TelemetryStore>,
        hub: Arc<BroadcastHub>,
        device: Arc<dyn DeviceSink>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        let heartbeat = HeartbeatConfig {
            interval: config.heartbeat_interval(),
            timeout: config.heartbeat_timeout(),
        };
        let state = AppState {
            store,
            hub,
            dispatcher: Arc::new(CommandDispatcher::new(device)),
            shutdown,
            heartbeat,
            start_time: Instant::now(),
        };
        Self { config, state }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Bind the viewer listener.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.config.bind_addr()).await
    }

    /// Serve on `listener` until the shutdown coordinator fires.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "viewer server started");

        let token = self.state.shutdown.token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(token.cancelled_owned())
            .await?;

        info!("viewer server stopped");
        Ok(())
    }

    /// Get the broadcast hub.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.state.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Build the router over `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/send_command", post(send_command_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        session::handle_viewer(
            socket,
            state.hub,
            state.heartbeat,
            state.shutdown.token(),
        )
    })
}

/// POST /send_command
async fn send_command_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<CommandResponse>) {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "command body is not JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(CommandResponse::error(format!("rejected: invalid JSON body: {e}"))),
            );
        }
    };

    match state.dispatcher.dispatch(&raw).await {
        Ok(_) => (StatusCode::OK, Json(CommandResponse::success())),
        Err(e) => {
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            warn!(kind = e.error_kind(), error = %e, "command failed");
            (status, Json(CommandResponse::error(e.to_string())))
        }
    }
}

/// GET /snapshot
async fn snapshot_handler(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.store.current_snapshot())
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.store.current_snapshot();
    let session = state.dispatcher.device_session();
    Json(health::health_check(
        state.start_time,
        state.hub.viewer_count(),
        session.as_ref(),
        snapshot.status(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use parking_lot::Mutex;
    use telebridge_core::DeviceError;
    use telebridge_device::SessionInfo;
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeDevice {
        connected: bool,
        fail: bool,
        writes: Mutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl DeviceSink for FakeDevice {
        async fn send_to_device(&self, bytes: Bytes) -> Result<(), DeviceError> {
            if !self.connected {
                return Err(DeviceError::NotConnected);
            }
            if self.fail {
                return Err(DeviceError::Transport("connection reset".into()));
            }
            self.writes.lock().push(bytes);
            Ok(())
        }

        fn session(&self) -> Option<SessionInfo> {
            self.connected.then(|| SessionInfo {
                id: 7,
                remote: "10.1.2.3:40000".parse().unwrap(),
                connected_at: "2026-05-04T08:30:00Z".parse().unwrap(),
            })
        }
    }

    fn make_server(device: FakeDevice) -> (Arc<FakeDevice>, BridgeServer) {
        let store = Arc::new(TelemetryStore::new());
        let hub = Arc::new(BroadcastHub::new(Arc::clone(&store), 8));
        let device = Arc::new(device);
        let server = BridgeServer::new(
            ServerConfig::default(),
            store,
            hub,
            Arc::clone(&device) as Arc<dyn DeviceSink>,
            Arc::new(ShutdownCoordinator::new()),
        );
        (device, server)
    }

    fn connected() -> FakeDevice {
        FakeDevice {
            connected: true,
            ..FakeDevice::default()
        }
    }

    async fn post_command(server: &BridgeServer, body: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/send_command")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn get_json(server: &BridgeServer, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn command_success() {
        let (device, server) = make_server(connected());
        let (status, body) = post_command(&server, r#"{"rate":10,"cycles":5}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(
            &device.writes.lock()[0][..],
            br#"{"cmd":"config","rate":10,"cycles":5}"#
        );
    }

    #[tokio::test]
    async fn command_without_device_is_400() {
        let (_device, server) = make_server(FakeDevice::default());
        let (status, body) = post_command(&server, r#"{"rate":10,"cycles":5}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("not connected"));
    }

    #[tokio::test]
    async fn invalid_command_is_400() {
        let (device, server) = make_server(connected());
        let (status, body) = post_command(&server, r#"{"rate":"fast","cycles":5}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("rejected"));
        assert!(device.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn non_json_body_is_400() {
        let (device, server) = make_server(connected());
        let (status, body) = post_command(&server, "rate=10&cycles=5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(device.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_500() {
        let (_device, server) = make_server(FakeDevice {
            connected: true,
            fail: true,
            ..FakeDevice::default()
        });
        let (status, body) = post_command(&server, r#"{"rate":1,"cycles":1}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn snapshot_endpoint_returns_current_state() {
        let (_device, server) = make_server(FakeDevice::default());
        let (status, body) = get_json(&server, "/snapshot").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "awaiting device connection");
        assert_eq!(body["DC"], 0.0);
        assert_eq!(body["time"], 0);
    }

    #[tokio::test]
    async fn health_reports_viewers_and_device() {
        let (_device, server) = make_server(connected());
        let (_conn, _rx) = server.hub().subscribe();
        let (status, body) = get_json(&server, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["viewers"], 1);
        assert_eq!(body["device_connected"], true);
        assert_eq!(body["device_status"], "awaiting_device");
        assert_eq!(body["device_remote"], "10.1.2.3:40000");
        assert_eq!(body["device_connected_at"], "2026-05-04T08:30:00Z");
    }

    #[tokio::test]
    async fn health_without_device_has_no_session() {
        let (_device, server) = make_server(FakeDevice::default());
        let (_, body) = get_json(&server, "/health").await;
        assert_eq!(body["device_connected"], false);
        assert!(body["device_remote"].is_null());
        assert!(body["device_connected_at"].is_null());
    }

    #[tokio::test]
    async fn ws_requires_upgrade() {
        let (_device, server) = make_server(FakeDevice::default());
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (_device, server) = make_server(FakeDevice::default());
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn accessors() {
        let (_device, server) = make_server(FakeDevice::default());
        assert_eq!(server.config().port, 5000);
        assert_eq!(server.hub().viewer_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
    }
}
