//! Postback profile entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "postback_profiles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub owner_id: Option<String>,
    /// global / campaign / offer / flow
    pub scope_type: String,
    pub scope_id: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    pub method: String,
    #[sea_orm(column_type = "Text")]
    pub endpoint_url_template: String,
    /// JSON 对象：参数名 → 模板
    #[sea_orm(column_type = "Text")]
    pub params_template: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub body_template: Option<String>,
    /// JSON 对象：内部事件类型 → 合作方状态
    #[sea_orm(column_type = "Text")]
    pub status_map: String,
    pub filter_revenue_gt0: bool,
    pub auth_query_key: Option<String>,
    pub auth_query_val: Option<String>,
    pub auth_header_name: Option<String>,
    pub auth_header_val: Option<String>,
    pub hmac_enabled: bool,
    pub hmac_secret: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub hmac_payload_template: Option<String>,
    pub hmac_param_name: Option<String>,
    pub retries: i32,
    pub backoff_base_sec: i32,
    pub timeout_ms: i32,
    pub url_encode: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
