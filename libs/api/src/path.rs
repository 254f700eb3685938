use crate::event::EventKind;

pub const METRICS: &str = "/metrics";
pub const STREAMS: &str = "/api/streams";
pub const HLS_STATUS: &str = "/api/hls-status";
pub const FAILED_WEBHOOKS: &str = "/api/failed-webhooks";
pub const FAILED_WEBHOOKS_RETRY: &str = "/api/failed-webhooks/retry";
pub const LIFECYCLES: &str = "/api/lifecycles";

pub const MANIFEST: &str = "index.m3u8";

pub fn whip(stream: &str) -> String {
    format!("/whip/{}", stream)
}

pub fn whep(stream: &str) -> String {
    format!("/whep/{}", stream)
}

pub fn session(stream: &str, session: &str) -> String {
    format!("/session/{}/{}", stream, session)
}

pub fn webhook(event: &str) -> String {
    format!("/webhooks/stream/{}", event)
}

pub fn webhook_event(event: EventKind) -> String {
    webhook(event.as_str())
}

pub fn live_manifest(stream: &str) -> String {
    format!("/live/{}/{}", stream, MANIFEST)
}

pub fn live_segment(stream: &str, segment: &str) -> String {
    format!("/live/{}/{}", stream, segment)
}

pub fn lifecycle(stream: &str) -> String {
    format!("{}/{}", LIFECYCLES, stream)
}

pub fn lifecycle_cancel(stream: &str) -> String {
    format!("{}/{}/cancel", LIFECYCLES, stream)
}
