//! Postback delivery attempt log (append-only)

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "postback_deliveries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub chain_id: String,
    pub profile_id: i64,
    pub event_id: String,
    pub click_id: String,
    pub attempt: i32,
    pub max_attempts: i32,
    /// success / http_error / transport_error / render_error
    pub status: String,
    pub request_method: String,
    #[sea_orm(column_type = "Text")]
    pub request_url: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub request_body: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub request_headers: Option<String>,
    pub response_code: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub response_body: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,
    pub duration_ms: i64,
    pub next_retry_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
