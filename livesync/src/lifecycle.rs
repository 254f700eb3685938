//! Lifecycle transitions driven by gateway webhooks.
//!
//! Everything here is pure; the service layer reads a row, runs one of these functions and
//! writes the result back conditionally on the row version.

use api::{
    event::EventKind,
    response::{Lifecycle, LiveStatus},
};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied(Lifecycle),
    /// Nothing to write; the reason ends up in logs and in the webhook reply.
    Ignored(&'static str),
}

/// `viewer` is the session id carried by play/stop webhooks. With one, a replayed play or stop
/// is ignored; without one, every play and stop counts.
pub fn apply(
    current: &Lifecycle,
    kind: EventKind,
    at: DateTime<Utc>,
    viewer: Option<&str>,
) -> Outcome {
    match kind {
        EventKind::Publish => publish(current, at),
        EventKind::Unpublish => unpublish(current, at),
        EventKind::Play => {
            if viewer.is_some_and(|id| current.viewer_ids.contains(id)) {
                return Outcome::Ignored("viewer already attached");
            }
            let mut next = touched(current, at);
            if let Some(id) = viewer {
                next.viewer_ids.insert(id.to_string());
            }
            next.viewer_count += 1;
            next.peak_viewer_count = next.peak_viewer_count.max(next.viewer_count);
            Outcome::Applied(next)
        }
        EventKind::Stop => {
            if viewer.is_some_and(|id| !current.viewer_ids.contains(id)) {
                return Outcome::Ignored("viewer not attached");
            }
            if current.viewer_count <= 0 {
                return Outcome::Ignored("viewer count already zero");
            }
            let mut next = touched(current, at);
            if let Some(id) = viewer {
                next.viewer_ids.remove(id);
            }
            next.viewer_count -= 1;
            Outcome::Applied(next)
        }
        EventKind::Connect | EventKind::Disconnect => Outcome::Ignored("informational event"),
    }
}

fn publish(current: &Lifecycle, at: DateTime<Utc>) -> Outcome {
    match current.live_status {
        LiveStatus::Cancelled => Outcome::Ignored("lifecycle cancelled"),
        LiveStatus::Ended | LiveStatus::Failed => match current.ended_at {
            Some(ended_at) if at <= ended_at => Outcome::Ignored("stale publish"),
            // a new broadcast on the same key
            _ => {
                let mut next = touched(current, at);
                next.live_status = LiveStatus::Live;
                next.is_live = true;
                next.started_at = Some(at);
                next.ended_at = None;
                next.duration_seconds = None;
                next.viewer_count = 0;
                next.peak_viewer_count = 0;
                next.viewer_ids.clear();
                Outcome::Applied(next)
            }
        },
        LiveStatus::Pending | LiveStatus::Scheduled | LiveStatus::Live => {
            let mut next = touched(current, at);
            next.live_status = LiveStatus::Live;
            next.is_live = true;
            next.started_at = current.started_at.or(Some(at));
            Outcome::Applied(next)
        }
    }
}

fn unpublish(current: &Lifecycle, at: DateTime<Utc>) -> Outcome {
    match current.live_status {
        LiveStatus::Cancelled => Outcome::Ignored("lifecycle cancelled"),
        LiveStatus::Ended | LiveStatus::Failed => Outcome::Ignored("already ended"),
        _ => match current.started_at {
            Some(started_at) if at < started_at => Outcome::Ignored("stale unpublish"),
            _ => Outcome::Applied(ended(current, LiveStatus::Ended, at)),
        },
    }
}

/// The gateway lost a live broadcast without an unpublish.
pub fn fail(current: &Lifecycle, at: DateTime<Utc>) -> Outcome {
    if current.live_status != LiveStatus::Live {
        return Outcome::Ignored("not live");
    }
    Outcome::Applied(ended(current, LiveStatus::Failed, at))
}

pub fn cancel(current: &Lifecycle) -> Outcome {
    match current.live_status {
        LiveStatus::Live => Outcome::Ignored("lifecycle is live"),
        LiveStatus::Cancelled => Outcome::Ignored("already cancelled"),
        _ => {
            let mut next = current.clone();
            next.live_status = LiveStatus::Cancelled;
            next.is_live = false;
            Outcome::Applied(next)
        }
    }
}

fn ended(current: &Lifecycle, status: LiveStatus, at: DateTime<Utc>) -> Lifecycle {
    let mut next = touched(current, at);
    next.live_status = status;
    next.is_live = false;
    next.ended_at = Some(at);
    next.duration_seconds = Some(
        current
            .started_at
            .map(|started_at| (at - started_at).num_seconds().max(0))
            .unwrap_or(0),
    );
    next
}

fn touched(current: &Lifecycle, at: DateTime<Utc>) -> Lifecycle {
    let mut next = current.clone();
    next.last_event_at = Some(next.last_event_at.map_or(at, |last| last.max(at)));
    next
}
