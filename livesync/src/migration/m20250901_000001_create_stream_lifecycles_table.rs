use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StreamLifecycles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StreamLifecycles::StreamKey)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StreamLifecycles::Title).string().null())
                    .col(
                        ColumnDef::new(StreamLifecycles::LiveStatus)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::IsLive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::ScheduledAt)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::StartedAt)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::EndedAt)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::DurationSeconds)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::ViewerCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::PeakViewerCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::ViewerIds)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::LastEventAt)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(StreamLifecycles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stream_lifecycles_status")
                    .table(StreamLifecycles::Table)
                    .col(StreamLifecycles::LiveStatus)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StreamLifecycles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StreamLifecycles {
    Table,
    StreamKey,
    Title,
    LiveStatus,
    IsLive,
    ScheduledAt,
    StartedAt,
    EndedAt,
    DurationSeconds,
    ViewerCount,
    PeakViewerCount,
    ViewerIds,
    LastEventAt,
    Version,
    CreatedAt,
    UpdatedAt,
}
