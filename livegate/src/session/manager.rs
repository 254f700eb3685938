use std::time::Duration;

use api::UNKNOWN_STREAM_KEY;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::{
    registry::Registry,
    termination::{force_close, Termination},
    Effect, Role, Session, SessionEvent, State, Transition,
};
use crate::{hook::OutboundWebhook, key::KeyMode, metrics};

/// Runs session transitions and carries out their effects.
///
/// Webhooks leave through `outbound` as owned snapshots, so no registry lock is held while the
/// dispatcher does network I/O.
#[derive(Clone)]
pub struct SessionManager {
    registry: Registry,
    outbound: mpsc::Sender<OutboundWebhook>,
    mode: KeyMode,
    grace: Duration,
}

impl SessionManager {
    pub fn new(
        registry: Registry,
        outbound: mpsc::Sender<OutboundWebhook>,
        mode: KeyMode,
        grace: Duration,
    ) -> Self {
        Self {
            registry,
            outbound,
            mode,
            grace,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    /// A fresh, not yet admitted session. It only reaches the registry once its key passes.
    pub fn connect(&self, role: Role, source_addr: String) -> Session {
        let session = Session::new(role, source_addr);
        debug!(session = session.id, addr = session.source_addr, ?role, "connect");
        session
    }

    /// connect, pre-publish, post-publish
    pub async fn publish(&self, key: &str, source_addr: String, conn: &dyn Termination) -> Session {
        let session = self.connect(Role::Publisher, source_addr);
        let session = self
            .handle(
                session,
                SessionEvent::PrePublish {
                    key: key.to_string(),
                },
                conn,
            )
            .await;
        if session.stream_key.is_none() {
            return session;
        }
        self.handle(session, SessionEvent::PostPublish, conn).await
    }

    pub async fn play(&self, key: &str, source_addr: String, conn: &dyn Termination) -> Session {
        let session = self.connect(Role::Viewer, source_addr);
        self.handle(
            session,
            SessionEvent::PrePlay {
                key: key.to_string(),
            },
            conn,
        )
        .await
    }

    /// Ends a registered session according to its role. `None` if the id is unknown.
    pub async fn disconnect(&self, id: &str, conn: &dyn Termination) -> Option<Session> {
        let session = self.registry.get(id).await?;
        let event = match session.role {
            Role::Publisher => SessionEvent::DonePublish,
            Role::Viewer => SessionEvent::DonePlay,
        };
        Some(self.handle(session, event, conn).await)
    }

    pub async fn handle(
        &self,
        session: Session,
        event: SessionEvent,
        conn: &dyn Termination,
    ) -> Session {
        let now = Utc::now();
        let mode = self.mode;
        let attempted_key = match &event {
            SessionEvent::PrePublish { key } | SessionEvent::PrePlay { key } => Some(key.clone()),
            _ => None,
        };

        // Registered sessions transition inside the registry, so concurrent viewer
        // attach/detach on the same entry is never overwritten.
        let in_registry = {
            let event = event.clone();
            self.registry
                .update(&session.id, move |current| {
                    let transition = current.apply(event, mode, now);
                    *current = transition.next.clone();
                    transition
                })
                .await
        };
        // Only a session that was never admitted (no key yet) transitions on its own copy. An
        // admitted one missing from the registry has already been removed.
        let Transition { next, effects } = match in_registry {
            Some(transition) => transition,
            None if session.state == State::Connecting && session.stream_key.is_none() => {
                session.apply(event, mode, now)
            }
            None => {
                debug!(session = session.id, state = ?session.state, "session no longer registered, event ignored");
                Transition::unchanged(&session)
            }
        };

        for effect in effects {
            match effect {
                Effect::Reject => {
                    metrics::REJECTED.inc();
                    let mechanism = force_close(conn);
                    warn!(
                        session = next.id,
                        addr = next.source_addr,
                        key = attempted_key.as_deref().unwrap_or_default(),
                        ?mechanism,
                        "invalid stream key, connection closed"
                    );
                }
                Effect::Register => {
                    self.registry.register(next.clone()).await;
                }
                Effect::Fire(kind) => {
                    let job = OutboundWebhook {
                        kind,
                        stream_key: next
                            .stream_key
                            .clone()
                            .unwrap_or_else(|| UNKNOWN_STREAM_KEY.to_string()),
                        session: next.clone(),
                        extra: None,
                        at: now,
                    };
                    if self.outbound.send(job).await.is_err() {
                        warn!(session = next.id, event = %kind, "outbound queue closed, webhook dropped");
                    }
                }
                Effect::AttachViewer { stream_key } => {
                    if !self.registry.attach_viewer(&stream_key, &next.id).await {
                        debug!(stream = stream_key, viewer = next.id, "no active publisher to attach");
                    }
                }
                Effect::DetachViewer { stream_key } => {
                    self.registry.detach_viewer(&stream_key, &next.id).await;
                }
                Effect::ScheduleRemoval => self.schedule_removal(next.id.clone()),
                Effect::Remove => {
                    self.registry.remove(&next.id).await;
                }
            }
        }

        refresh_metrics(&self.registry).await;
        next
    }

    fn schedule_removal(&self, id: String) {
        let registry = self.registry.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if registry.remove_ended(&id).await.is_some() {
                debug!(session = id, "ended session removed after grace period");
                refresh_metrics(&registry).await;
            }
        });
    }
}

async fn refresh_metrics(registry: &Registry) {
    let counts = registry.counts().await;
    metrics::SESSIONS.set(counts.sessions as f64);
    metrics::PUBLISHERS.set(counts.publishers as f64);
    metrics::VIEWERS.set(counts.viewers as f64);
}

/// Reaps ended sessions the grace timers missed and logs the registry size.
pub async fn monitor_tick(
    manager: SessionManager,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
        let reaped = manager
            .registry
            .reap_ended(manager.grace, Utc::now())
            .await;
        if !reaped.is_empty() {
            info!(count = reaped.len(), "reaped ended sessions");
        }
        refresh_metrics(&manager.registry).await;
        let counts = manager.registry.counts().await;
        debug!(
            sessions = counts.sessions,
            publishers = counts.publishers,
            viewers = counts.viewers,
            "session monitor"
        );
    }
    debug!("session monitor stopped");
}
