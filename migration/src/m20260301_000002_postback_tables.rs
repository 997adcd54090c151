//! Postback 表迁移
//!
//! - postback_profiles: 投递目标配置
//! - postback_deliveries: 每次尝试一行，只追加
//! - postback_retry_jobs: 持久化重试队列，进程重启后仍可继续

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PostbackProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PostbackProfiles::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::Name)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::OwnerId)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::ScopeType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::ScopeId)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::Method)
                            .string_len(8)
                            .not_null()
                            .default("GET"),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::EndpointUrlTemplate)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::ParamsTemplate)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::BodyTemplate)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::StatusMap)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::FilterRevenueGt0)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::AuthQueryKey)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::AuthQueryVal)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::AuthHeaderName)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::AuthHeaderVal)
                            .string_len(1024)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::HmacEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::HmacSecret)
                            .string_len(1024)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::HmacPayloadTemplate)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::HmacParamName)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::Retries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::BackoffBaseSec)
                            .integer()
                            .not_null()
                            .default(2),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::TimeoutMs)
                            .integer()
                            .not_null()
                            .default(4000),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::UrlEncode)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackProfiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 匹配查询：WHERE enabled AND (scope_type, scope_id) IN ...
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_postback_profiles_scope")
                    .table(PostbackProfiles::Table)
                    .col(PostbackProfiles::ScopeType)
                    .col(PostbackProfiles::ScopeId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PostbackDeliveries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PostbackDeliveries::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::ChainId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::ProfileId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::EventId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::ClickId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::Attempt)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::MaxAttempts)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::RequestMethod)
                            .string_len(8)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::RequestUrl)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PostbackDeliveries::RequestBody).text().null())
                    .col(
                        ColumnDef::new(PostbackDeliveries::RequestHeaders)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::ResponseCode)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::ResponseBody)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(PostbackDeliveries::Error).text().null())
                    .col(
                        ColumnDef::new(PostbackDeliveries::DurationMs)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::NextRetryAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PostbackDeliveries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 投递日志常用过滤：profile + 时间、状态、事件、链路
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_postback_deliveries_profile_time")
                    .table(PostbackDeliveries::Table)
                    .col(PostbackDeliveries::ProfileId)
                    .col(PostbackDeliveries::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_postback_deliveries_created_at")
                    .table(PostbackDeliveries::Table)
                    .col(PostbackDeliveries::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_postback_deliveries_event_id")
                    .table(PostbackDeliveries::Table)
                    .col(PostbackDeliveries::EventId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_postback_deliveries_chain_id")
                    .table(PostbackDeliveries::Table)
                    .col(PostbackDeliveries::ChainId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PostbackRetryJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PostbackRetryJobs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PostbackRetryJobs::ChainId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackRetryJobs::ProfileId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackRetryJobs::EventId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackRetryJobs::Attempt)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackRetryJobs::DueAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PostbackRetryJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_postback_retry_jobs_due_at")
                    .table(PostbackRetryJobs::Table)
                    .col(PostbackRetryJobs::DueAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PostbackRetryJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PostbackDeliveries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PostbackProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PostbackProfiles {
    #[sea_orm(iden = "postback_profiles")]
    Table,
    Id,
    Name,
    OwnerId,
    ScopeType,
    ScopeId,
    Priority,
    Enabled,
    Method,
    EndpointUrlTemplate,
    ParamsTemplate,
    BodyTemplate,
    StatusMap,
    #[sea_orm(iden = "filter_revenue_gt0")]
    FilterRevenueGt0,
    AuthQueryKey,
    AuthQueryVal,
    AuthHeaderName,
    AuthHeaderVal,
    HmacEnabled,
    HmacSecret,
    HmacPayloadTemplate,
    HmacParamName,
    Retries,
    BackoffBaseSec,
    TimeoutMs,
    UrlEncode,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PostbackDeliveries {
    #[sea_orm(iden = "postback_deliveries")]
    Table,
    Id,
    ChainId,
    ProfileId,
    EventId,
    ClickId,
    Attempt,
    MaxAttempts,
    Status,
    RequestMethod,
    RequestUrl,
    RequestBody,
    RequestHeaders,
    ResponseCode,
    ResponseBody,
    Error,
    DurationMs,
    NextRetryAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PostbackRetryJobs {
    #[sea_orm(iden = "postback_retry_jobs")]
    Table,
    Id,
    ChainId,
    ProfileId,
    EventId,
    Attempt,
    DueAt,
    CreatedAt,
}
