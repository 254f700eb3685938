pub mod stream_lifecycles;
