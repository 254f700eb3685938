pub mod database;
pub mod stream_lifecycles;
