use axum::response::{IntoResponse, Response};
use http::StatusCode;

#[derive(Debug)]
pub enum AppError {
    InvalidStreamKey(String),
    SessionNotFound(String),
    ResourceNotFound(String),
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn invalid_stream_key<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::InvalidStreamKey(t.to_string())
    }

    pub fn session_not_found<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::SessionNotFound(t.to_string())
    }

    pub fn resource_not_found<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::ResourceNotFound(t.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::InvalidStreamKey(err) => (StatusCode::FORBIDDEN, err).into_response(),
            AppError::SessionNotFound(err) => (StatusCode::NOT_FOUND, err).into_response(),
            AppError::ResourceNotFound(err) => (StatusCode::NOT_FOUND, err).into_response(),
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
