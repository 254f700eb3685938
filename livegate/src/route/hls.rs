use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use http::{header, StatusCode};
use tracing::debug;

use crate::error::AppError;
use crate::key;
use crate::route::AppState;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

pub fn route() -> Router<AppState> {
    Router::new().route(&api::path::live_segment("{stream}", "{file}"), get(live))
}

async fn live(
    State(state): State<AppState>,
    Path((stream, file)): Path<(String, String)>,
) -> crate::result::Result<Response<Body>> {
    if !key::validate(&stream, state.config.key_mode()) {
        return Err(AppError::invalid_stream_key("invalid stream key"));
    }
    let content_type = if file == api::path::MANIFEST {
        PLAYLIST_CONTENT_TYPE
    } else if key::validate_segment(&file) {
        SEGMENT_CONTENT_TYPE
    } else {
        return Err(AppError::invalid_stream_key("invalid segment name"));
    };

    let path = state.config.hls.media_root.join(&stream).join(&file);
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "hls file not found");
            return Err(AppError::resource_not_found(format!("{stream}/{file} not found")));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(body))?)
}
