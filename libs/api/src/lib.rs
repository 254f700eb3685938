pub mod event;
pub mod path;
pub mod request;
pub mod response;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Placeholder used when no stream key could be recovered from a connection.
pub const UNKNOWN_STREAM_KEY: &str = "unknown";
