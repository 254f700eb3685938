use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::response::Response;
use axum::routing::{delete, post};
use axum::Router;
use http::{header, StatusCode};

use crate::error::AppError;
use crate::route::AppState;
use crate::session::termination::{extract_stream_key, Detached, KeySource, RequestConnection};

pub fn route() -> Router<AppState> {
    Router::new()
        .route(&api::path::whip("{stream}"), post(whip))
        .route(&api::path::whep("{stream}"), post(whep))
        .route(
            &api::path::session("{stream}", "{session}"),
            delete(remove_session),
        )
}

fn stream_key(stream: &str) -> String {
    extract_stream_key(&KeySource {
        args: Some(stream),
        ..Default::default()
    })
}

fn created(stream: &str, session: &str) -> crate::result::Result<Response<String>> {
    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header(header::LOCATION, api::path::session(stream, session))
        .body("".to_string())?)
}

async fn whip(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(stream): Path<String>,
) -> crate::result::Result<Response<String>> {
    let key = stream_key(&stream);
    let conn = RequestConnection::default();
    let session = state.manager.publish(&key, addr.to_string(), &conn).await;
    if conn.is_rejected() || !session.publish_active() {
        return Err(AppError::invalid_stream_key("invalid stream key"));
    }
    created(&key, &session.id)
}

async fn whep(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(stream): Path<String>,
) -> crate::result::Result<Response<String>> {
    let key = stream_key(&stream);
    let conn = RequestConnection::default();
    let session = state.manager.play(&key, addr.to_string(), &conn).await;
    if conn.is_rejected() || session.stream_key.is_none() {
        return Err(AppError::invalid_stream_key("invalid stream key"));
    }
    created(&key, &session.id)
}

async fn remove_session(
    State(state): State<AppState>,
    Path((stream, session)): Path<(String, String)>,
) -> crate::result::Result<Response<String>> {
    match state.manager.registry().get(&session).await {
        Some(current) if current.stream_key.as_deref() == Some(stream.as_str()) => {}
        _ => return Err(AppError::session_not_found(format!("session {session} not found"))),
    }
    state
        .manager
        .disconnect(&session, &Detached)
        .await
        .ok_or_else(|| AppError::session_not_found(format!("session {session} not found")))?;
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body("".to_string())?)
}
