use axum::response::{IntoResponse, Response};
use http::StatusCode;

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    BadRequest(String),
    ResourceNotFound,
    ResourceAlreadyExists,
    Conflict(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "invalid webhook secret".to_string()).into_response()
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::ResourceNotFound => {
                (StatusCode::NOT_FOUND, "resource not exists".to_string()).into_response()
            }
            AppError::ResourceAlreadyExists => {
                (StatusCode::CONFLICT, "resource already exists".to_string()).into_response()
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            AppError::InternalServerError(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        AppError::InternalServerError(err.into())
    }
}
