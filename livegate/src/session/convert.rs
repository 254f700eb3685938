use api::response::{SessionRole, SessionState};

use super::{Role, Session, State};

impl From<Role> for SessionRole {
    fn from(value: Role) -> Self {
        match value {
            Role::Publisher => SessionRole::Publisher,
            Role::Viewer => SessionRole::Viewer,
        }
    }
}

impl From<State> for SessionState {
    fn from(value: State) -> Self {
        match value {
            State::Connecting => SessionState::Connecting,
            State::Publishing => SessionState::Publishing,
            State::Playing => SessionState::Playing,
            State::Ended => SessionState::Ended,
        }
    }
}

impl From<&Session> for api::response::Session {
    fn from(value: &Session) -> Self {
        Self {
            id: value.id.clone(),
            stream_key: value.stream_key.clone(),
            role: value.role.into(),
            state: value.state.into(),
            publish_active: value.publish_active(),
            connected_at: value.connected_at,
            viewers: value.viewer_connections.len() as u64,
        }
    }
}
