use crate::SharedController;
use antenna_controller::{AntennaStatus, DeviceError, PositionReading};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use utoipa::{OpenApi, ToSchema};

/// # API Documentation
///
/// `ApiDoc` generates the OpenAPI specification for the rotor status API,
/// which exposes the same dish the rotctld listener drives.
#[derive(OpenApi)]
#[openapi(
    paths(status, move_antenna, stop_antenna),
    components(schemas(StatusResponse, MoveRequest)),
    tags(
        (name = "Rotor", description = "Status and manual control of the antenna rotor")
    )
)]
pub struct ApiDoc;

/// Current antenna status.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct StatusResponse {
    /// Azimuth of the last completed move, in degrees.
    #[schema(example = 180.0)]
    pub azimuth: f64,
    /// Elevation of the last completed move, in degrees.
    #[schema(example = 45.0)]
    pub elevation: f64,
    pub is_moving: bool,
    /// Last fault, cleared by the next successful move.
    pub error: Option<String>,
    #[schema(example = "g 180.0 45.0")]
    pub last_command: Option<String>,
}

impl From<AntennaStatus> for StatusResponse {
    fn from(status: AntennaStatus) -> Self {
        Self {
            azimuth: status.position.azimuth(),
            elevation: status.position.elevation(),
            is_moving: status.is_moving,
            error: status.error.map(|kind| kind.to_string()),
            last_command: status.last_command,
        }
    }
}

/// Manual pointing request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MoveRequest {
    #[schema(example = 180.0)]
    pub azimuth: f64,
    #[schema(example = 45.0)]
    pub elevation: f64,
}

pub fn router(controller: SharedController) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/move", post(move_antenna))
        .route("/stop", post(stop_antenna))
        .route("/api-docs/openapi.json", get(openapi))
        .with_state(controller)
}

/// Serves the API until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    controller: SharedController,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!("Status API available at http://{}/status", listener.local_addr()?);

    axum::serve(listener, router(controller))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

async fn openapi() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/status",
    tag = "Rotor",
    responses(
        (status = 200, description = "Current status", body = StatusResponse)
    )
)]
pub async fn status(State(controller): State<SharedController>) -> Json<StatusResponse> {
    Json(controller.current_status().into())
}

#[utoipa::path(
    post,
    path = "/move",
    tag = "Rotor",
    request_body = MoveRequest,
    responses(
        (status = 200, description = "Move finished, `success` tells whether the dish reported its position"),
        (status = 400, description = "Position out of range")
    )
)]
pub async fn move_antenna(
    State(controller): State<SharedController>,
    Json(request): Json<MoveRequest>,
) -> impl IntoResponse {
    let target = match PositionReading::new(request.azimuth, request.elevation) {
        Ok(target) => target,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "message": e.to_string()})),
            );
        }
    };

    match tokio::task::spawn_blocking(move || controller.move_to(target)).await {
        Ok(Ok(_)) => (StatusCode::OK, Json(json!({"success": true}))),
        Ok(Err(e @ DeviceError::InvalidPosition(_))) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": e.to_string()})),
        ),
        Ok(Err(e)) => (
            StatusCode::OK,
            Json(json!({"success": false, "message": e.to_string()})),
        ),
        Err(e) => {
            error!("Move task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "message": "move task failed"})),
            )
        }
    }
}

#[utoipa::path(
    post,
    path = "/stop",
    tag = "Rotor",
    responses(
        (status = 200, description = "Stop command sent")
    )
)]
pub async fn stop_antenna(State(controller): State<SharedController>) -> impl IntoResponse {
    match tokio::task::spawn_blocking(move || controller.stop()).await {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({"success": true}))),
        Ok(Err(e)) => (
            StatusCode::OK,
            Json(json!({"success": false, "message": e.to_string()})),
        ),
        Err(e) => {
            error!("Stop task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "message": "stop task failed"})),
            )
        }
    }
}
