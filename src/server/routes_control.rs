//! Control API routes.
//!
//! Status and playback control for the channel as a whole. There is no
//! per-viewer state to address: pause pauses for everyone, seek seeks for
//! everyone.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::AppContext;
use crate::error::ControlError;

/// Create control routes.
pub fn control_routes() -> Router<AppContext> {
    Router::new()
        .route("/status", get(get_status))
        .route("/playback/pause", post(pause))
        .route("/playback/resume", post(resume))
        .route("/playback/seek", post(seek))
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub offset_secs: f64,
}

async fn get_status(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.station.snapshot().await)
}

async fn pause(State(ctx): State<AppContext>) -> Result<StatusCode, ControlResponse> {
    ctx.station.pause().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resume(State(ctx): State<AppContext>) -> Result<StatusCode, ControlResponse> {
    ctx.station.resume().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> Result<StatusCode, ControlResponse> {
    ctx.station.seek(req.offset_secs).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Wraps [`ControlError`] with its HTTP mapping.
pub struct ControlResponse(ControlError);

impl From<ControlError> for ControlResponse {
    fn from(err: ControlError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ControlResponse {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ControlError::InvalidSeekTarget { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ControlError::UnknownProfile(_) => StatusCode::NOT_FOUND,
            ControlError::PlaylistTimeout { .. } | ControlError::LaunchFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ControlError::EpochPersist(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_error_status_mapping() {
        let resp = ControlResponse(ControlError::InvalidSeekTarget {
            target_secs: -1.0,
            duration_secs: 100.0,
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = ControlResponse(ControlError::UnknownProfile("hd".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp =
            ControlResponse(ControlError::PlaylistTimeout { waited_secs: 10 }).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
