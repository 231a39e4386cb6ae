use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use scanner_lib::command::{execute_command, CommandResponse, ScanCommand};
use scanner_lib::{ExportCause, ScanError};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::ExportFormat;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

/// Scanner error rendered as `{kind, error, retry_safe}`
pub struct ApiError(pub ScanError);

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        Self(e)
    }
}

pub fn status_code(err: &ScanError) -> StatusCode {
    match err {
        ScanError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ScanError::OperationInProgress
        | ScanError::ExportBusy
        | ScanError::NoScene => StatusCode::CONFLICT,
        ScanError::NoGeometry => StatusCode::UNPROCESSABLE_ENTITY,
        ScanError::Export(e) => match e.cause {
            ExportCause::EmptyScene => StatusCode::UNPROCESSABLE_ENTITY,
            ExportCause::EncodingFailure(_) | ExportCause::IoFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        ScanError::ArtifactMissing { .. } => StatusCode::NOT_FOUND,
        ScanError::InvalidDestination { .. } => StatusCode::BAD_REQUEST,
        ScanError::TransferError { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "kind": self.0.kind(),
            "error": self.0.to_string(),
            "retry_safe": self.0.is_retry_safe(),
        });
        (status_code(&self.0), Json(body)).into_response()
    }
}

fn bad_request(kind: &str, error: impl std::fmt::Display) -> Response {
    let body = json!({ "kind": kind, "error": error.to_string(), "retry_safe": false });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// Health check
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Session state, scene summary, export job and latest artifact
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.scanner.status()).unwrap_or(Value::Null))
}

pub async fn start_scan(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.scanner.start_scan().await?;
    Ok(Json(json!({ "state": state.scanner.state() })))
}

pub async fn stop_scan(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let scene = state.scanner.stop_scan().await?;
    Ok(Json(json!({ "state": state.scanner.state(), "summary": scene.summary() })))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub format: String,
}

/// Export the captured scene to the default artifact path
pub async fn export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Response {
    let format = match ExportFormat::from_name(&request.format) {
        Ok(format) => format,
        Err(e) => return bad_request("unknown_format", e),
    };
    match state.scanner.export(format).await {
        Ok(artifact) => Json(json!({ "artifact": artifact })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub destination: String,
}

/// Upload the latest artifact
pub async fn upload(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<Value>, ApiError> {
    let receipt = state.scanner.upload_latest(&request.destination).await?;
    Ok(Json(json!({ "receipt": receipt })))
}

/// Bytes of the latest artifact
pub async fn artifact(State(state): State<AppState>) -> Result<Response, ApiError> {
    let missing = || ScanError::ArtifactMissing {
        path: Default::default(),
    };
    let artifact = state.scanner.last_artifact().ok_or_else(missing)?;
    let bytes = tokio::fs::read(&artifact.path).await.map_err(|e| {
        tracing::error!("Reading {} failed: {e}", artifact.path.display());
        ScanError::ArtifactMissing {
            path: artifact.path.clone(),
        }
    })?;

    let filename = artifact
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("scan.{}", artifact.format.extension()));

    Ok((
        [
            (header::CONTENT_TYPE, artifact.format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// JSON command protocol over HTTP
pub async fn command(
    State(state): State<AppState>,
    Json(cmd): Json<ScanCommand>,
) -> Json<CommandResponse> {
    Json(execute_command(&state.scanner, cmd).await)
}

/// Websocket stream of scan events
pub async fn events(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| forward_events(socket, state))
}

async fn forward_events(mut socket: WebSocket, state: AppState) {
    let mut rx = state.scanner.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    tracing::debug!("Event subscriber disconnected");
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Event subscriber lagged, {skipped} events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
