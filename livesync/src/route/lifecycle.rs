use api::{
    request::{CreateLifecycle, LifecycleQuery},
    response::{Lifecycle, LiveStatus},
};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;

use crate::error::AppError;
use crate::route::AppState;
use crate::service::stream_lifecycles::{EventResult, StreamLifecyclesService};

pub fn route() -> Router<AppState> {
    Router::new()
        .route(
            api::path::LIFECYCLES,
            get(list_lifecycles).post(create_lifecycle),
        )
        .route(&api::path::lifecycle("{stream}"), get(get_lifecycle))
        .route(
            &api::path::lifecycle_cancel("{stream}"),
            post(cancel_lifecycle),
        )
}

async fn create_lifecycle(
    State(state): State<AppState>,
    Json(req): Json<CreateLifecycle>,
) -> crate::result::Result<(StatusCode, Json<Lifecycle>)> {
    if req.stream_key.trim().is_empty() {
        return Err(AppError::BadRequest("streamKey is required".to_string()));
    }
    match StreamLifecyclesService::create(state.database.get_connection(), req).await? {
        Some(lifecycle) => Ok((StatusCode::CREATED, Json(lifecycle))),
        None => Err(AppError::ResourceAlreadyExists),
    }
}

async fn list_lifecycles(
    State(state): State<AppState>,
    Query(query): Query<LifecycleQuery>,
) -> crate::result::Result<Json<Vec<Lifecycle>>> {
    let db = state.database.get_connection();
    let lifecycles = match query.status {
        Some(status) => StreamLifecyclesService::list_by_status(db, status).await?,
        None => StreamLifecyclesService::list(db).await?,
    };
    Ok(Json(lifecycles))
}

async fn get_lifecycle(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> crate::result::Result<Json<Lifecycle>> {
    StreamLifecyclesService::find(state.database.get_connection(), &stream)
        .await?
        .map(Json)
        .ok_or(AppError::ResourceNotFound)
}

async fn cancel_lifecycle(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> crate::result::Result<Json<Lifecycle>> {
    match StreamLifecyclesService::cancel(state.database.get_connection(), &stream).await? {
        EventResult::Unknown => Err(AppError::ResourceNotFound),
        EventResult::Applied(lifecycle) => Ok(Json(lifecycle)),
        EventResult::Unchanged(lifecycle, _) if lifecycle.live_status != LiveStatus::Live => {
            Ok(Json(lifecycle))
        }
        EventResult::Unchanged(_, reason) => Err(AppError::Conflict(reason.to_string())),
    }
}
