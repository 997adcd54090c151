//! 归因表迁移
//!
//! 创建 clicks / events / offers 三张表：
//! - clicks: click_id 主键保证点击唯一
//! - events: (click_id, event_type, txid) 唯一索引即幂等键
//! - offers: 落地页解析（由管理端维护）

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Clicks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Clicks::ClickId)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Clicks::CampaignId).string_len(64).null())
                    .col(ColumnDef::new(Clicks::OfferId).string_len(64).null())
                    .col(ColumnDef::new(Clicks::FlowId).string_len(64).null())
                    .col(ColumnDef::new(Clicks::SourceId).string_len(64).null())
                    .col(ColumnDef::new(Clicks::Sub1).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Sub2).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Sub3).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Sub4).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Sub5).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Sub6).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Sub7).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Sub8).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Sub9).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Sub10).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Sub2Params).text().null())
                    .col(ColumnDef::new(Clicks::UtmSource).string_len(255).null())
                    .col(ColumnDef::new(Clicks::UtmMedium).string_len(255).null())
                    .col(ColumnDef::new(Clicks::UtmCampaign).string_len(255).null())
                    .col(ColumnDef::new(Clicks::UtmTerm).string_len(255).null())
                    .col(ColumnDef::new(Clicks::UtmContent).string_len(255).null())
                    .col(ColumnDef::new(Clicks::Referrer).text().null())
                    .col(ColumnDef::new(Clicks::UserAgent).text().null())
                    .col(ColumnDef::new(Clicks::LandingUrl).text().null())
                    .col(ColumnDef::new(Clicks::Ip).string_len(45).null())
                    .col(ColumnDef::new(Clicks::CountryIso).string_len(2).null())
                    .col(ColumnDef::new(Clicks::Region).string_len(100).null())
                    .col(ColumnDef::new(Clicks::City).string_len(100).null())
                    .col(ColumnDef::new(Clicks::Isp).string_len(255).null())
                    .col(ColumnDef::new(Clicks::IsProxy).boolean().null())
                    .col(ColumnDef::new(Clicks::BrowserName).string_len(100).null())
                    .col(ColumnDef::new(Clicks::BrowserVersion).string_len(50).null())
                    .col(ColumnDef::new(Clicks::OsName).string_len(100).null())
                    .col(ColumnDef::new(Clicks::OsVersion).string_len(50).null())
                    .col(ColumnDef::new(Clicks::DeviceType).string_len(50).null())
                    .col(
                        ColumnDef::new(Clicks::CreatedAt)
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
                    .name("idx_clicks_created_at")
                    .table(Clicks::Table)
                    .col(Clicks::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_clicks_offer_id")
                    .table(Clicks::Table)
                    .col(Clicks::OfferId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Events::EventId)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Events::ClickId).string_len(64).not_null())
                    .col(ColumnDef::new(Events::EventType).string_len(16).not_null())
                    .col(ColumnDef::new(Events::Revenue).double().null())
                    .col(ColumnDef::new(Events::Currency).string_len(3).null())
                    .col(
                        ColumnDef::new(Events::Txid)
                            .string_len(128)
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Events::TimeOnPageMs).big_integer().null())
                    .col(
                        ColumnDef::new(Events::Dispatched)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Events::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 幂等键：数据库层唯一约束，并发重复提交落到同一结果
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_events_idempotency")
                    .table(Events::Table)
                    .col(Events::ClickId)
                    .col(Events::EventType)
                    .col(Events::Txid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_created_at")
                    .table(Events::Table)
                    .col(Events::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Offers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Offers::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Offers::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Offers::LandingUrl).text().not_null())
                    .col(
                        ColumnDef::new(Offers::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Offers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Offers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Clicks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Clicks {
    #[sea_orm(iden = "clicks")]
    Table,
    ClickId,
    CampaignId,
    OfferId,
    FlowId,
    SourceId,
    Sub1,
    Sub2,
    Sub3,
    Sub4,
    Sub5,
    Sub6,
    Sub7,
    Sub8,
    Sub9,
    Sub10,
    #[sea_orm(iden = "sub2_params")]
    Sub2Params,
    UtmSource,
    UtmMedium,
    UtmCampaign,
    UtmTerm,
    UtmContent,
    Referrer,
    UserAgent,
    LandingUrl,
    Ip,
    CountryIso,
    Region,
    City,
    Isp,
    IsProxy,
    BrowserName,
    BrowserVersion,
    OsName,
    OsVersion,
    DeviceType,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Events {
    #[sea_orm(iden = "events")]
    Table,
    EventId,
    ClickId,
    EventType,
    Revenue,
    Currency,
    Txid,
    TimeOnPageMs,
    Dispatched,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Offers {
    #[sea_orm(iden = "offers")]
    Table,
    Id,
    Name,
    LandingUrl,
    Enabled,
    CreatedAt,
}
