use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter};
use tracing::debug;

use super::converters::{event_to_active_model, model_to_event};
use super::{SeaOrmStorage, retry};
use crate::errors::{ClickTrailError, Result};
use crate::storage::models::{Event, EventType, InsertOutcome};

use migration::entities::event;

impl SeaOrmStorage {
    /// 依赖唯一索引 (click_id, event_type, txid) 的幂等插入
    pub(super) async fn insert_event_row(&self, new_event: Event) -> Result<InsertOutcome<Event>> {
        let db = &self.db;
        let model = event_to_active_model(&new_event);

        let inserted = retry::with_retry("insert_event", self.retry_config, || {
            let model = model.clone();
            async move {
                let result = event::Entity::insert(model)
                    .on_conflict(
                        OnConflict::columns([
                            event::Column::ClickId,
                            event::Column::EventType,
                            event::Column::Txid,
                        ])
                        .do_nothing()
                        .to_owned(),
                    )
                    .exec_without_returning(db)
                    .await;
                match result {
                    Err(DbErr::RecordNotInserted) => Ok(0),
                    other => other,
                }
            }
        })
        .await?;

        if inserted > 0 {
            return Ok(InsertOutcome::Created(new_event));
        }

        let existing = self
            .find_event_by_key(
                &new_event.click_id,
                new_event.event_type,
                new_event.txid.as_deref(),
            )
            .await?
            .ok_or_else(|| {
                ClickTrailError::database_operation(format!(
                    "事件 ({}, {}) 插入冲突但无法读取已有记录",
                    new_event.click_id, new_event.event_type
                ))
            })?;
        debug!(
            "Duplicate event ({}, {}, {:?}) -> {}",
            existing.click_id, existing.event_type, existing.txid, existing.event_id
        );
        Ok(InsertOutcome::Existing(existing))
    }

    pub(super) async fn find_event_row(&self, event_id: &str) -> Result<Option<Event>> {
        let db = &self.db;
        let id = event_id.to_string();

        let model = retry::with_retry("find_event", self.retry_config, || {
            event::Entity::find_by_id(id.clone()).one(db)
        })
        .await?;

        model.map(model_to_event).transpose()
    }

    /// 按幂等键查找事件
    pub async fn find_event_by_key(
        &self,
        click_id: &str,
        event_type: EventType,
        txid: Option<&str>,
    ) -> Result<Option<Event>> {
        let db = &self.db;
        let click_id = click_id.to_string();
        let event_type = event_type.as_ref().to_string();
        let txid = txid.unwrap_or_default().to_string();

        let model = retry::with_retry("find_event_by_key", self.retry_config, || {
            event::Entity::find()
                .filter(event::Column::ClickId.eq(click_id.clone()))
                .filter(event::Column::EventType.eq(event_type.clone()))
                .filter(event::Column::Txid.eq(txid.clone()))
                .one(db)
        })
        .await?;

        model.map(model_to_event).transpose()
    }

    /// 条件更新 dispatched 标记，只有状态确实翻转时返回 true
    pub(super) async fn set_dispatched(&self, event_id: &str, dispatched: bool) -> Result<bool> {
        let db = &self.db;
        let id = event_id.to_string();

        let result = retry::with_retry("set_event_dispatched", self.retry_config, || {
            event::Entity::update_many()
                .col_expr(event::Column::Dispatched, Expr::value(dispatched))
                .filter(event::Column::EventId.eq(id.clone()))
                .filter(event::Column::Dispatched.eq(!dispatched))
                .exec(db)
        })
        .await?;

        Ok(result.rows_affected == 1)
    }
}
