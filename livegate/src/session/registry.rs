use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{Role, Session, State};

/// Admitted ingest connections keyed by session id.
///
/// Callers never see the map itself: every operation takes the lock for the duration of one
/// synchronous mutation and hands back clones.
#[derive(Clone, Default)]
pub struct Registry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub sessions: u64,
    pub publishers: u64,
    pub viewers: u64,
}

impl Registry {
    pub async fn register(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn update<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        self.sessions.write().await.get_mut(id).map(f)
    }

    pub async fn remove(&self, id: &str) -> Option<Session> {
        self.sessions.write().await.remove(id)
    }

    /// Removes the session only if it is still ended; a session id is never reused, but this
    /// keeps a late timer from touching anything else.
    pub async fn remove_ended(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(session) if session.state == State::Ended => sessions.remove(id),
            _ => None,
        }
    }

    pub async fn snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));
        sessions
    }

    /// Attaches `viewer` to the publishing session of `stream_key`. Linear scan.
    pub async fn attach_viewer(&self, stream_key: &str, viewer: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions
            .values_mut()
            .find(|s| s.publish_active() && s.stream_key.as_deref() == Some(stream_key))
        {
            Some(publisher) => publisher.viewer_connections.insert(viewer.to_string()),
            None => false,
        }
    }

    /// Detaches `viewer` from every publisher session of `stream_key`, including ended ones
    /// still inside their grace period.
    pub async fn detach_viewer(&self, stream_key: &str, viewer: &str) -> bool {
        let mut detached = false;
        let mut sessions = self.sessions.write().await;
        for session in sessions
            .values_mut()
            .filter(|s| s.role == Role::Publisher && s.stream_key.as_deref() == Some(stream_key))
        {
            detached |= session.viewer_connections.remove(viewer);
        }
        detached
    }

    /// Drops ended sessions whose grace period elapsed. Returns the removed ids.
    pub async fn reap_ended(&self, grace: Duration, now: DateTime<Utc>) -> Vec<String> {
        let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero());
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.state == State::Ended && s.ended_at.is_some_and(|at| at + grace <= now))
            .map(|s| s.id.clone())
            .collect();
        for id in expired.iter() {
            sessions.remove(id);
            debug!(session = id, "reaped ended session");
        }
        expired
    }

    pub async fn counts(&self) -> Counts {
        let sessions = self.sessions.read().await;
        sessions.values().fold(
            Counts {
                sessions: sessions.len() as u64,
                ..Default::default()
            },
            |mut counts, s| {
                if s.publish_active() {
                    counts.publishers += 1;
                    counts.viewers += s.viewer_connections.len() as u64;
                }
                counts
            },
        )
    }
}
