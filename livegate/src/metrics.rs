use lazy_static::lazy_static;
use prometheus::{Gauge, IntCounter, Registry, TextEncoder};

lazy_static! {
    pub static ref SESSIONS: Gauge = Gauge::new("sessions", "admitted session number").unwrap();
    pub static ref PUBLISHERS: Gauge = Gauge::new("publishers", "active publisher number").unwrap();
    pub static ref VIEWERS: Gauge = Gauge::new("viewers", "attached viewer number").unwrap();
    pub static ref REJECTED: IntCounter =
        IntCounter::new("rejected", "connections refused for an invalid stream key").unwrap();
    pub static ref WEBHOOK_DELIVERED: IntCounter =
        IntCounter::new("webhook_delivered", "webhooks delivered").unwrap();
    pub static ref WEBHOOK_FAILED: IntCounter =
        IntCounter::new("webhook_failed", "failed webhook delivery attempts").unwrap();
    pub static ref WEBHOOK_PERSISTED: IntCounter =
        IntCounter::new("webhook_persisted", "webhooks persisted after retry exhaustion").unwrap();
    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("livegate".to_string()), None).unwrap();
    pub static ref ENCODER: TextEncoder = TextEncoder::new();
}

pub fn register() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(SESSIONS.clone()))?;
    REGISTRY.register(Box::new(PUBLISHERS.clone()))?;
    REGISTRY.register(Box::new(VIEWERS.clone()))?;
    REGISTRY.register(Box::new(REJECTED.clone()))?;
    REGISTRY.register(Box::new(WEBHOOK_DELIVERED.clone()))?;
    REGISTRY.register(Box::new(WEBHOOK_FAILED.clone()))?;
    REGISTRY.register(Box::new(WEBHOOK_PERSISTED.clone()))?;
    Ok(())
}

pub fn encode() -> String {
    ENCODER
        .encode_to_string(&REGISTRY.gather())
        .unwrap_or_default()
}
