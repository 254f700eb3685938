use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::BodyExt;
use tracing::{error, info, trace, warn};

/// Headers whose values never reach the logs.
const REDACTED_HEADERS: [&str; 2] = ["authorization", "x-webhook-secret"];

const SLOW_REQUEST_MILLIS: u128 = 500;

pub async fn print_request_response(
    req: Request,
    next: Next,
) -> std::result::Result<impl IntoResponse, (StatusCode, String)> {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let (parts, body) = req.into_parts();
    let bytes = buffer_and_print("request", redact(&parts.headers), body).await?;
    let req = Request::from_parts(parts, Body::from(bytes));

    let res = next.run(req).await;
    let (parts, body) = res.into_parts();
    let bytes = buffer_and_print("response", redact(&parts.headers), body).await?;
    let res = Response::from_parts(parts, Body::from(bytes));

    let millis = start.elapsed().as_millis();
    let status = res.status().as_u16();
    if res.status().is_server_error() {
        error!("[{method} {uri}] [{status}] {millis}ms");
    } else if res.status().is_client_error() || millis > SLOW_REQUEST_MILLIS {
        warn!("[{method} {uri}] [{status}] {millis}ms");
    } else {
        info!("[{method} {uri}] [{status}] {millis}ms");
    }

    Ok(res)
}

fn redact(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    for name in REDACTED_HEADERS {
        if headers.contains_key(name) {
            headers.insert(name, HeaderValue::from_static("***"));
        }
    }
    headers
}

async fn buffer_and_print<B>(
    direction: &str,
    headers: HeaderMap,
    body: B,
) -> std::result::Result<Bytes, (StatusCode, String)>
where
    B: axum::body::HttpBody<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("failed to read {direction} body: {err}"),
            ));
        }
    };

    if let Ok(body) = std::str::from_utf8(&bytes) {
        trace!("{direction} headers = {headers:?} body = {body:?}");
    }

    Ok(bytes)
}
