use anyhow::{anyhow, Context, Result};
use api::{
    event::EventKind,
    request::CreateLifecycle,
    response::{Lifecycle, LiveStatus},
};
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::debug;

use crate::entity::stream_lifecycles::{self, Entity as StreamLifecycles};
use crate::lifecycle::{self, Outcome};

/// Conditional writes retried before giving up on a contended row.
const MAX_UPDATE_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum EventResult {
    /// No lifecycle for this stream key.
    Unknown,
    Unchanged(Lifecycle, &'static str),
    Applied(Lifecycle),
}

pub struct StreamLifecyclesService;

impl StreamLifecyclesService {
    /// `None` if a lifecycle already exists for the key.
    pub async fn create(
        db: &DatabaseConnection,
        req: CreateLifecycle,
    ) -> Result<Option<Lifecycle>> {
        if StreamLifecycles::find_by_id(req.stream_key.clone())
            .one(db)
            .await?
            .is_some()
        {
            return Ok(None);
        }
        let now = now_offset();
        let status = if req.scheduled_at.is_some() {
            LiveStatus::Scheduled
        } else {
            LiveStatus::Pending
        };
        let model = stream_lifecycles::ActiveModel {
            stream_key: Set(req.stream_key),
            title: Set(req.title),
            live_status: Set(status.as_str().to_string()),
            is_live: Set(false),
            scheduled_at: Set(req.scheduled_at.map(|at| at.timestamp_millis())),
            started_at: Set(None),
            ended_at: Set(None),
            duration_seconds: Set(None),
            viewer_count: Set(0),
            peak_viewer_count: Set(0),
            viewer_ids: Set("[]".to_string()),
            last_event_at: Set(None),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = model.insert(db).await?;
        Ok(Some(to_lifecycle(&inserted)?))
    }

    pub async fn find(db: &DatabaseConnection, stream_key: &str) -> Result<Option<Lifecycle>> {
        StreamLifecycles::find_by_id(stream_key.to_string())
            .one(db)
            .await?
            .map(|model| to_lifecycle(&model))
            .transpose()
    }

    pub async fn list(db: &DatabaseConnection) -> Result<Vec<Lifecycle>> {
        StreamLifecycles::find()
            .order_by_desc(stream_lifecycles::Column::CreatedAt)
            .order_by_asc(stream_lifecycles::Column::StreamKey)
            .all(db)
            .await?
            .iter()
            .map(to_lifecycle)
            .collect()
    }

    pub async fn list_by_status(
        db: &DatabaseConnection,
        status: LiveStatus,
    ) -> Result<Vec<Lifecycle>> {
        StreamLifecycles::find()
            .filter(stream_lifecycles::Column::LiveStatus.eq(status.as_str()))
            .order_by_asc(stream_lifecycles::Column::StreamKey)
            .all(db)
            .await?
            .iter()
            .map(to_lifecycle)
            .collect()
    }

    /// Read, transition, write back only if nobody else wrote in between. `None` if the row
    /// does not exist.
    pub async fn update<F>(
        db: &DatabaseConnection,
        stream_key: &str,
        transition: F,
    ) -> Result<Option<EventResult>>
    where
        F: Fn(&Lifecycle) -> Outcome,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let Some(model) = StreamLifecycles::find_by_id(stream_key.to_string())
                .one(db)
                .await?
            else {
                return Ok(None);
            };
            let current = to_lifecycle(&model)?;
            let next = match transition(&current) {
                Outcome::Ignored(reason) => {
                    return Ok(Some(EventResult::Unchanged(current, reason)))
                }
                Outcome::Applied(next) => next,
            };

            let result = StreamLifecycles::update_many()
                .set(stream_lifecycles::ActiveModel {
                    live_status: Set(next.live_status.as_str().to_string()),
                    is_live: Set(next.is_live),
                    started_at: Set(next.started_at.map(|at| at.timestamp_millis())),
                    ended_at: Set(next.ended_at.map(|at| at.timestamp_millis())),
                    duration_seconds: Set(next.duration_seconds),
                    viewer_count: Set(next.viewer_count),
                    peak_viewer_count: Set(next.peak_viewer_count),
                    viewer_ids: Set(serde_json::to_string(&next.viewer_ids)?),
                    last_event_at: Set(next.last_event_at.map(|at| at.timestamp_millis())),
                    version: Set(model.version + 1),
                    updated_at: Set(now_offset()),
                    ..Default::default()
                })
                .filter(stream_lifecycles::Column::StreamKey.eq(stream_key))
                .filter(stream_lifecycles::Column::Version.eq(model.version))
                .exec(db)
                .await?;
            if result.rows_affected == 1 {
                return Ok(Some(EventResult::Applied(next)));
            }
            debug!(stream = stream_key, attempt, "lifecycle version conflict, retrying");
        }
        Err(anyhow!(
            "lifecycle {} still contended after {} attempts",
            stream_key,
            MAX_UPDATE_ATTEMPTS
        ))
    }

    /// `viewer` is the session id of the webhook, used to count play/stop once per viewer.
    pub async fn apply_event(
        db: &DatabaseConnection,
        stream_key: &str,
        kind: EventKind,
        at: DateTime<Utc>,
        viewer: Option<&str>,
    ) -> Result<EventResult> {
        Ok(Self::update(db, stream_key, |current| {
            lifecycle::apply(current, kind, at, viewer)
        })
        .await?
        .unwrap_or(EventResult::Unknown))
    }

    pub async fn cancel(db: &DatabaseConnection, stream_key: &str) -> Result<EventResult> {
        Ok(Self::update(db, stream_key, lifecycle::cancel)
            .await?
            .unwrap_or(EventResult::Unknown))
    }

    pub async fn mark_failed(
        db: &DatabaseConnection,
        stream_key: &str,
        at: DateTime<Utc>,
    ) -> Result<EventResult> {
        Ok(
            Self::update(db, stream_key, |current| lifecycle::fail(current, at))
                .await?
                .unwrap_or(EventResult::Unknown),
        )
    }
}

fn now_offset() -> DateTime<FixedOffset> {
    DateTime::<FixedOffset>::from(Utc::now())
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::<Utc>::from_timestamp_millis)
}

fn to_lifecycle(model: &stream_lifecycles::Model) -> Result<Lifecycle> {
    Ok(Lifecycle {
        stream_key: model.stream_key.clone(),
        title: model.title.clone(),
        live_status: model.live_status.parse().map_err(|e: String| anyhow!(e))?,
        is_live: model.is_live,
        scheduled_at: from_millis(model.scheduled_at),
        started_at: from_millis(model.started_at),
        ended_at: from_millis(model.ended_at),
        duration_seconds: model.duration_seconds,
        viewer_count: model.viewer_count,
        peak_viewer_count: model.peak_viewer_count,
        last_event_at: from_millis(model.last_event_at),
        viewer_ids: serde_json::from_str(&model.viewer_ids)
            .with_context(|| format!("Failed to parse viewer ids of {}", model.stream_key))?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use sea_orm::{ConnectOptions, Database};

    use super::*;
    use crate::migration::{Migrator, MigratorTrait};

    async fn db() -> DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    fn create(stream_key: &str) -> CreateLifecycle {
        CreateLifecycle {
            stream_key: stream_key.to_string(),
            title: Some("Sunday Service".to_string()),
            scheduled_at: None,
        }
    }

    fn millis(at: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis()).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let db = db().await;
        let created = StreamLifecyclesService::create(&db, create("smc_validkey123"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(LiveStatus::Pending, created.live_status);
        assert!(StreamLifecyclesService::create(&db, create("smc_validkey123"))
            .await
            .unwrap()
            .is_none());

        let scheduled = StreamLifecyclesService::create(
            &db,
            CreateLifecycle {
                scheduled_at: Some(Utc::now()),
                ..create("smc_scheduled1")
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(LiveStatus::Scheduled, scheduled.live_status);

        assert_eq!(2, StreamLifecyclesService::list(&db).await.unwrap().len());
        assert_eq!(
            1,
            StreamLifecyclesService::list_by_status(&db, LiveStatus::Scheduled)
                .await
                .unwrap()
                .len()
        );
        assert!(StreamLifecyclesService::find(&db, "smc_missing01")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_stream() {
        let db = db().await;
        assert_eq!(
            EventResult::Unknown,
            StreamLifecyclesService::apply_event(
                &db,
                "smc_missing01",
                EventKind::Publish,
                Utc::now(),
                None
            )
            .await
            .unwrap()
        );
    }

    #[tokio::test]
    async fn test_broadcast_lifecycle() {
        let db = db().await;
        let key = "smc_validkey123";
        StreamLifecyclesService::create(&db, create(key)).await.unwrap();

        let t0 = millis(Utc::now());
        let result = StreamLifecyclesService::apply_event(&db, key, EventKind::Publish, t0, None)
            .await
            .unwrap();
        assert!(matches!(result, EventResult::Applied(_)));
        for viewer in ["v1", "v2", "v3"] {
            StreamLifecyclesService::apply_event(&db, key, EventKind::Play, t0, Some(viewer))
                .await
                .unwrap();
        }
        StreamLifecyclesService::apply_event(&db, key, EventKind::Stop, t0, Some("v2"))
            .await
            .unwrap();

        let current = StreamLifecyclesService::find(&db, key).await.unwrap().unwrap();
        assert_eq!(LiveStatus::Live, current.live_status);
        assert_eq!(Some(t0), current.started_at);
        assert_eq!(2, current.viewer_count);
        assert_eq!(3, current.peak_viewer_count);

        let t1 = t0 + Duration::seconds(75);
        StreamLifecyclesService::apply_event(&db, key, EventKind::Unpublish, t1, None)
            .await
            .unwrap();
        let ended = StreamLifecyclesService::find(&db, key).await.unwrap().unwrap();
        assert_eq!(LiveStatus::Ended, ended.live_status);
        assert!(!ended.is_live);
        assert_eq!(Some(t1), ended.ended_at);
        assert_eq!(Some(75), ended.duration_seconds);

        let again = StreamLifecyclesService::apply_event(
            &db,
            key,
            EventKind::Unpublish,
            t1 + Duration::seconds(5),
            None,
        )
        .await
        .unwrap();
        assert!(matches!(again, EventResult::Unchanged(_, "already ended")));
        assert_eq!(
            ended,
            StreamLifecyclesService::find(&db, key).await.unwrap().unwrap()
        );
    }

    #[tokio::test]
    async fn test_replayed_play_and_stop_count_once() {
        let db = db().await;
        let key = "smc_validkey123";
        StreamLifecyclesService::create(&db, create(key)).await.unwrap();
        let at = millis(Utc::now());
        StreamLifecyclesService::apply_event(&db, key, EventKind::Publish, at, None)
            .await
            .unwrap();

        for _ in 0..2 {
            StreamLifecyclesService::apply_event(&db, key, EventKind::Play, at, Some("viewer-1"))
                .await
                .unwrap();
        }
        let current = StreamLifecyclesService::find(&db, key).await.unwrap().unwrap();
        assert_eq!(1, current.viewer_count);
        assert_eq!(1, current.peak_viewer_count);
        assert!(current.viewer_ids.contains("viewer-1"));

        let replay =
            StreamLifecyclesService::apply_event(&db, key, EventKind::Play, at, Some("viewer-1"))
                .await
                .unwrap();
        assert!(matches!(replay, EventResult::Unchanged(_, "viewer already attached")));

        for _ in 0..2 {
            StreamLifecyclesService::apply_event(&db, key, EventKind::Stop, at, Some("viewer-1"))
                .await
                .unwrap();
        }
        let current = StreamLifecyclesService::find(&db, key).await.unwrap().unwrap();
        assert_eq!(0, current.viewer_count);
        assert!(current.viewer_ids.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_plays_all_count() {
        let db = db().await;
        let key = "smc_validkey123";
        StreamLifecyclesService::create(&db, create(key)).await.unwrap();

        let mut handles = vec![];
        for i in 0..10 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let viewer = format!("viewer-{i}");
                StreamLifecyclesService::apply_event(
                    &db,
                    key,
                    EventKind::Play,
                    Utc::now(),
                    Some(viewer.as_str()),
                )
                .await
                .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let current = StreamLifecyclesService::find(&db, key).await.unwrap().unwrap();
        assert_eq!(10, current.viewer_count);
        assert_eq!(10, current.peak_viewer_count);
    }

    #[tokio::test]
    async fn test_cancel_and_fail() {
        let db = db().await;
        StreamLifecyclesService::create(&db, create("smc_cancelme1"))
            .await
            .unwrap();
        let cancelled = StreamLifecyclesService::cancel(&db, "smc_cancelme1")
            .await
            .unwrap();
        assert!(matches!(cancelled, EventResult::Applied(ref l) if l.live_status == LiveStatus::Cancelled));

        StreamLifecyclesService::create(&db, create("smc_failing01"))
            .await
            .unwrap();
        StreamLifecyclesService::apply_event(
            &db,
            "smc_failing01",
            EventKind::Publish,
            Utc::now(),
            None,
        )
        .await
        .unwrap();
        let result = StreamLifecyclesService::cancel(&db, "smc_failing01")
            .await
            .unwrap();
        assert!(matches!(result, EventResult::Unchanged(_, "lifecycle is live")));
        let failed = StreamLifecyclesService::mark_failed(&db, "smc_failing01", Utc::now())
            .await
            .unwrap();
        assert!(matches!(failed, EventResult::Applied(ref l) if l.live_status == LiveStatus::Failed));
    }
}
