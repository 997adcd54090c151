//! Conversion / lifecycle event entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "events")]
pub struct Model {
    /// UUID v7，按时间可排序
    #[sea_orm(primary_key, auto_increment = false)]
    pub event_id: String,
    pub click_id: String,
    pub event_type: String,
    pub revenue: Option<f64>,
    pub currency: Option<String>,
    /// 无外部交易号时存空字符串，使唯一索引 (click_id, event_type, txid) 生效
    pub txid: String,
    pub time_on_page_ms: Option<i64>,
    /// 已领取投递权；派发失败时复位，重复提交可再次派发
    pub dispatched: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
