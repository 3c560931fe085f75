pub mod cache;
pub mod config;
pub mod error;
pub mod janitor;
pub mod library;
pub mod metrics;
pub mod model;
pub mod pathsafe;
pub mod playlist;
pub mod readiness;
pub mod registry;
pub mod streamer;
pub mod transcoder;

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::StreamerError;
use crate::model::Variant;
use crate::streamer::Streamer;

/// Root-relative base path segment URLs are rewritten against (§4.5).
const HLS_BASE_PATH: &str = "/hls";

struct AppState {
    streamer: Streamer,
}

pub fn create_app(streamer: Streamer) -> Router {
    let state = Arc::new(AppState { streamer });

    Router::new()
        .route("/hls.m3u8", get(hls_playlist_handler))
        .route("/hls", get(hls_segment_handler))
        .route("/metrics", get(metrics_handler))
        .route("/rest/ping.view", get(ping_handler))
        .route("/rest/getMusicFolders.view", get(music_folders_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PlaylistQuery {
    id: String,
    #[serde(rename = "bitRate")]
    bit_rate: Option<u32>,
    #[serde(rename = "audioTrack")]
    audio_track: Option<String>,
}

async fn hls_playlist_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PlaylistQuery>,
) -> Result<Response, StreamerError> {
    let variant = Variant::new(params.bit_rate.unwrap_or(128), params.audio_track);
    info!(item_id = params.id, bitrate = variant.bitrate_kbps, "HLS playlist request");

    let text = state
        .streamer
        .generate_playlist(&params.id, variant, HLS_BASE_PATH)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        text,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SegmentQuery {
    key: String,
}

async fn hls_segment_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SegmentQuery>,
) -> Result<Response, StreamerError> {
    let path = state.streamer.serve_segment(&params.key).await?;
    let content_type = streamer::mime_type_for(&path);

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| StreamerError::Internal(e.into()))?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

/// Minimal Subsonic-subset endpoint so the HLS core sits behind a plausible
/// host surface; the JSON shape itself is out of scope (§11.4).
async fn ping_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(json!({
            "subsonic-response": { "status": "ok", "version": "1.16.1" }
        })),
    )
}

async fn music_folders_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(json!({
            "subsonic-response": {
                "status": "ok",
                "version": "1.16.1",
                "musicFolders": { "musicFolder": [{ "id": 0, "name": "Library" }] }
            }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::library::{FsLibraryIndex, LibraryIndex};
    use crate::model::MediaSource;
    use crate::registry::JobRegistry;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn build_streamer(library: std::sync::Arc<dyn LibraryIndex>, cache_root: PathBuf, transcoder: &str) -> Streamer {
        let cache = CacheStore::new(100, Duration::from_secs(3600), true);
        let registry = JobRegistry::new(4, transcoder.to_string(), Duration::from_secs(600));
        Streamer::new(library, cache, registry, cache_root)
    }

    #[tokio::test]
    async fn item_not_found_maps_to_404() {
        struct EmptyLibrary;
        #[async_trait]
        impl LibraryIndex for EmptyLibrary {
            async fn lookup(&self, _item_id: &str) -> Option<MediaSource> {
                None
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let streamer = build_streamer(std::sync::Arc::new(EmptyLibrary), tmp.path().to_path_buf(), "ffmpeg");
        let app = create_app(streamer);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/hls.m3u8?id=missing.flac&bitRate=128")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn path_escape_on_segment_request_is_403() {
        let tmp = tempfile::tempdir().unwrap();
        let streamer = build_streamer(
            std::sync::Arc::new(FsLibraryIndex::new(tmp.path().to_path_buf())),
            tmp.path().join("cache"),
            "ffmpeg",
        );
        let app = create_app(streamer);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/hls?key=..%2F..%2Fetc%2Fpasswd")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn segment_not_found_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_root = tmp.path().join("cache");
        tokio::fs::create_dir_all(&cache_root).await.unwrap();
        let streamer = build_streamer(
            std::sync::Arc::new(FsLibraryIndex::new(tmp.path().to_path_buf())),
            cache_root,
            "ffmpeg",
        );
        let app = create_app(streamer);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/hls?key=a.flac%2F128_default%2Fsegment_000.ts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ping_endpoint_returns_ok_status() {
        let tmp = tempfile::tempdir().unwrap();
        let streamer = build_streamer(
            std::sync::Arc::new(FsLibraryIndex::new(tmp.path().to_path_buf())),
            tmp.path().join("cache"),
            "ffmpeg",
        );
        let app = create_app(streamer);

        let response = app
            .oneshot(Request::builder().uri("/rest/ping.view").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = BodyExt::collect(response.into_body()).await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["subsonic-response"]["status"], "ok");
    }
}
