//! HLS artifact routes.
//!
//! `GET /stream/:profile/:file` serves playlists and segments straight off
//! disk. Every hit doubles as a liveness ping for the viewer registry and may
//! lazily start the encoder, so the handler tolerates the artifact not being
//! on disk yet with a short bounded wait.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;

use super::AppContext;
use crate::error::ControlError;

/// How long a request waits for its artifact to show up on disk. Segments
/// lag the playlist by up to one segment duration after a cold start.
const ARTIFACT_WAIT: Duration = Duration::from_secs(5);
const ARTIFACT_POLL: Duration = Duration::from_millis(100);

/// Create streaming routes.
pub fn stream_routes() -> Router<AppContext> {
    Router::new().route("/:profile/:file", get(serve_artifact))
}

async fn serve_artifact(
    State(ctx): State<AppContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path((profile, file)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !is_safe_filename(&file) {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let client_id = client_identifier(&headers, peer);

    let gate = match ctx.station.request_artifact(&profile, &client_id).await {
        Ok(gate) => gate,
        Err(ControlError::UnknownProfile(_)) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, profile, "Stream unavailable");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let path = ctx
        .config
        .media
        .output_dir
        .join(&profile)
        .join(&file);

    // A paused channel with no encoder serves whatever is already on disk;
    // waiting would never be satisfied.
    let wait = if gate.running {
        ARTIFACT_WAIT
    } else {
        Duration::ZERO
    };

    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::fs::read(&path).await {
            Ok(body) => {
                return (
                    [
                        (header::CONTENT_TYPE, content_type(&file)),
                        (header::CACHE_CONTROL, "no-cache"),
                    ],
                    body,
                )
                    .into_response();
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if tokio::time::Instant::now() >= deadline {
                    return StatusCode::NOT_FOUND.into_response();
                }
                tokio::time::sleep(ARTIFACT_POLL).await;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read artifact");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }
}

/// Identify the client by the first `X-Forwarded-For` entry when present
/// (the station usually sits behind a reverse proxy), otherwise the peer
/// address without the port.
fn client_identifier(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Only plain filenames are served; anything that could traverse out of the
/// profile directory is rejected.
fn is_safe_filename(file: &str) -> bool {
    !file.is_empty() && !file.contains('/') && !file.contains('\\') && !file.contains("..")
}

fn content_type(file: &str) -> &'static str {
    if file.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else if file.ends_with(".ts") {
        "video/MP2T"
    } else if file.ends_with(".m4s") || file.ends_with(".mp4") {
        "video/mp4"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filenames() {
        assert!(is_safe_filename("live.m3u8"));
        assert!(is_safe_filename("seg42.ts"));
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename("../epoch.json"));
        assert!(!is_safe_filename("a/b.ts"));
        assert!(!is_safe_filename("a\\b.ts"));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type("live.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type("seg0.ts"), "video/MP2T");
        assert_eq!(content_type("seg0.m4s"), "video/mp4");
        assert_eq!(content_type("weird.bin"), "application/octet-stream");
    }

    #[test]
    fn test_client_identifier_prefers_forwarded_for() {
        let peer: SocketAddr = "192.168.1.9:51000".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_identifier(&headers, peer), "203.0.113.7");

        let empty = HeaderMap::new();
        assert_eq!(client_identifier(&empty, peer), "192.168.1.9");
    }
}
