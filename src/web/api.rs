//! REST API endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::camera::{CameraSourceSpec, CameraStatus, SelectOutcome};
use crate::error::CameraError;
use crate::output::sse;
use crate::session::SessionStatus;
use crate::AppState;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

impl ApiResponse<()> {
    pub fn error(message: &str) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        })
    }
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub session: SessionStatus,
    pub camera: CameraStatus,
    pub tick: u64,
    pub fps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub version: String,
}

/// Get session and camera status
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.get_snapshot().await;

    ApiResponse::success(StatusResponse {
        session: snapshot.status(),
        camera: state.camera.status(),
        tick: snapshot.tick(),
        fps: snapshot.fps(),
        error_message: snapshot.error_message().map(str::to_string),
        version: crate::VERSION.to_string(),
    })
}

/// Get current configuration
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.config.read().await;
    Json(config.clone())
}

/// Get the latest session snapshot
pub async fn get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.get_snapshot().await)
}

/// List video inputs for webcam selection
pub async fn get_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.camera.list_devices().await {
        Ok(devices) => ApiResponse::success(devices).into_response(),
        Err(e) => {
            tracing::warn!("Device enumeration failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, ApiResponse::error(&e.to_string())).into_response()
        }
    }
}

/// Source selection result
#[derive(Debug, Serialize)]
pub struct SourceResponse {
    pub outcome: &'static str,
    pub camera: CameraStatus,
}

/// Select a new camera source.
///
/// The switch runs on its own task so a disconnecting client cannot cancel
/// it halfway through.
pub async fn select_source(
    State(state): State<Arc<AppState>>,
    Json(source): Json<CameraSourceSpec>,
) -> impl IntoResponse {
    tracing::info!("Source selection requested: {}", source.display_name());

    let camera = Arc::clone(&state.camera);
    let result = tokio::spawn(async move { camera.select_source(source).await }).await;

    let outcome = match result {
        Ok(Ok(SelectOutcome::Ready)) => "ready",
        Ok(Ok(SelectOutcome::Superseded)) => "superseded",
        Ok(Err(e)) => {
            let status = match e {
                CameraError::InvalidSource(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            };
            return (status, ApiResponse::error(&e.to_string())).into_response();
        }
        Err(e) => {
            tracing::error!("Source selection task failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::error("source selection aborted"),
            )
                .into_response();
        }
    };

    ApiResponse::success(SourceResponse {
        outcome,
        camera: state.camera.status(),
    })
    .into_response()
}

/// SSE stream endpoint
pub async fn snapshot_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    sse::create_snapshot_stream(state).await
}
