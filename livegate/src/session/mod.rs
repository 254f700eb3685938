//! Per-connection session state machine.
//!
//! Transport callbacks are turned into [`SessionEvent`]s; [`Session::apply`] is pure and returns
//! the next session plus the [`Effect`]s the [`manager::SessionManager`] has to carry out.

use std::collections::HashSet;

use api::event::EventKind;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::key::{self, KeyMode};

pub mod convert;
pub mod manager;
pub mod registry;
pub mod termination;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publisher,
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connecting,
    Publishing,
    Playing,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PrePublish { key: String },
    PostPublish,
    DonePublish,
    PrePlay { key: String },
    DonePlay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Force-close the underlying connection.
    Reject,
    /// Insert the session into the registry.
    Register,
    Fire(EventKind),
    AttachViewer { stream_key: String },
    DetachViewer { stream_key: String },
    /// Remove the session once the grace period elapsed.
    ScheduleRemoval,
    Remove,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub next: Session,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(session: &Session) -> Self {
        Self {
            next: session.clone(),
            effects: vec![],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub role: Role,
    pub state: State,
    pub stream_key: Option<String>,
    pub source_addr: String,
    pub connected_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub viewer_connections: HashSet<String>,
}

impl Session {
    pub fn new(role: Role, source_addr: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            state: State::Connecting,
            stream_key: None,
            source_addr,
            connected_at: Utc::now(),
            published_at: None,
            ended_at: None,
            viewer_connections: HashSet::new(),
        }
    }

    pub fn publish_active(&self) -> bool {
        self.state == State::Publishing
    }

    pub fn apply(&self, event: SessionEvent, mode: KeyMode, now: DateTime<Utc>) -> Transition {
        match (self.state, event) {
            (State::Connecting, SessionEvent::PrePublish { key }) => {
                self.admit(Role::Publisher, key, mode, now)
            }
            (State::Connecting, SessionEvent::PrePlay { key }) => {
                let mut transition = self.admit(Role::Viewer, key, mode, now);
                if let Some(stream_key) = transition.next.stream_key.clone() {
                    transition.next.state = State::Playing;
                    transition.effects.extend([
                        Effect::AttachViewer { stream_key },
                        Effect::Fire(EventKind::Play),
                    ]);
                }
                transition
            }
            (State::Connecting, SessionEvent::PostPublish)
                if self.role == Role::Publisher && self.stream_key.is_some() =>
            {
                let mut next = self.clone();
                next.state = State::Publishing;
                next.published_at = Some(now);
                Transition {
                    next,
                    effects: vec![Effect::Fire(EventKind::Publish)],
                }
            }
            (State::Publishing, SessionEvent::DonePublish) => {
                let mut next = self.ended(now);
                next.viewer_connections.clear();
                Transition {
                    next,
                    effects: vec![
                        Effect::Fire(EventKind::Unpublish),
                        Effect::Fire(EventKind::Disconnect),
                        Effect::ScheduleRemoval,
                    ],
                }
            }
            // admitted but never started publishing
            (State::Connecting, SessionEvent::DonePublish) if self.stream_key.is_some() => {
                Transition {
                    next: self.ended(now),
                    effects: vec![Effect::Fire(EventKind::Disconnect), Effect::Remove],
                }
            }
            (State::Playing, SessionEvent::DonePlay) => {
                let stream_key = self.stream_key.clone().unwrap_or_default();
                Transition {
                    next: self.ended(now),
                    effects: vec![
                        Effect::DetachViewer { stream_key },
                        Effect::Fire(EventKind::Stop),
                        Effect::Fire(EventKind::Disconnect),
                        Effect::Remove,
                    ],
                }
            }
            _ => Transition::unchanged(self),
        }
    }

    fn admit(&self, role: Role, key: String, mode: KeyMode, now: DateTime<Utc>) -> Transition {
        let mut next = self.clone();
        next.role = role;
        if !key::validate(&key, mode) {
            return Transition {
                next: next.ended(now),
                effects: vec![Effect::Reject],
            };
        }
        next.stream_key = Some(key);
        Transition {
            next,
            effects: vec![Effect::Register, Effect::Fire(EventKind::Connect)],
        }
    }

    fn ended(&self, now: DateTime<Utc>) -> Session {
        let mut next = self.clone();
        next.state = State::Ended;
        next.ended_at = Some(now);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher() -> Session {
        Session::new(Role::Publisher, "127.0.0.1:50000".to_string())
    }

    fn pre_publish(key: &str) -> SessionEvent {
        SessionEvent::PrePublish {
            key: key.to_string(),
        }
    }

    #[test]
    fn test_publisher_path() {
        let now = Utc::now();
        let t = publisher().apply(pre_publish("smc_validkey123"), KeyMode::Strict, now);
        assert_eq!(
            vec![Effect::Register, Effect::Fire(EventKind::Connect)],
            t.effects
        );
        assert_eq!(State::Connecting, t.next.state);
        assert!(!t.next.publish_active());

        let t = t.next.apply(SessionEvent::PostPublish, KeyMode::Strict, now);
        assert_eq!(vec![Effect::Fire(EventKind::Publish)], t.effects);
        assert!(t.next.publish_active());
        assert_eq!(Some("smc_validkey123"), t.next.stream_key.as_deref());
        assert_eq!(Some(now), t.next.published_at);

        let t = t.next.apply(SessionEvent::DonePublish, KeyMode::Strict, now);
        assert_eq!(
            vec![
                Effect::Fire(EventKind::Unpublish),
                Effect::Fire(EventKind::Disconnect),
                Effect::ScheduleRemoval
            ],
            t.effects
        );
        assert_eq!(State::Ended, t.next.state);
        assert_eq!(Some(now), t.next.ended_at);
    }

    #[test]
    fn test_invalid_key_never_publishes() {
        let now = Utc::now();
        let t = publisher().apply(pre_publish("../../etc/passwd"), KeyMode::Strict, now);
        assert_eq!(vec![Effect::Reject], t.effects);
        assert_eq!(State::Ended, t.next.state);
        assert!(t.next.stream_key.is_none());

        let t = t.next.apply(SessionEvent::PostPublish, KeyMode::Strict, now);
        assert!(t.effects.is_empty());
        assert!(!t.next.publish_active());
    }

    #[test]
    fn test_post_publish_requires_admission() {
        let t = publisher().apply(SessionEvent::PostPublish, KeyMode::Permissive, Utc::now());
        assert!(t.effects.is_empty());
        assert_eq!(State::Connecting, t.next.state);
    }

    #[test]
    fn test_viewer_path() {
        let now = Utc::now();
        let viewer = Session::new(Role::Viewer, "127.0.0.1:50001".to_string());
        let t = viewer.apply(
            SessionEvent::PrePlay {
                key: "smc_validkey123".to_string(),
            },
            KeyMode::Strict,
            now,
        );
        assert_eq!(State::Playing, t.next.state);
        assert_eq!(
            vec![
                Effect::Register,
                Effect::Fire(EventKind::Connect),
                Effect::AttachViewer {
                    stream_key: "smc_validkey123".to_string()
                },
                Effect::Fire(EventKind::Play),
            ],
            t.effects
        );

        let t = t.next.apply(SessionEvent::DonePlay, KeyMode::Strict, now);
        assert_eq!(State::Ended, t.next.state);
        assert_eq!(
            vec![
                Effect::DetachViewer {
                    stream_key: "smc_validkey123".to_string()
                },
                Effect::Fire(EventKind::Stop),
                Effect::Fire(EventKind::Disconnect),
                Effect::Remove,
            ],
            t.effects
        );

        // a second detach is ignored
        let t = t.next.apply(SessionEvent::DonePlay, KeyMode::Strict, now);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_done_before_publish() {
        let now = Utc::now();
        let t = publisher().apply(pre_publish("smc_validkey123"), KeyMode::Strict, now);
        let t = t.next.apply(SessionEvent::DonePublish, KeyMode::Strict, now);
        assert_eq!(
            vec![Effect::Fire(EventKind::Disconnect), Effect::Remove],
            t.effects
        );
    }
}
