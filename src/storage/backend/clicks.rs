//! 点击写入与查询，以及 `AttributionStore` 实现

use async_trait::async_trait;
use sea_orm::{DbErr, EntityTrait, sea_query::OnConflict};
use tracing::debug;

use super::converters::{click_to_active_model, model_to_click};
use super::{SeaOrmStorage, retry};
use crate::errors::{ClickTrailError, Result};
use crate::storage::models::{Click, Event, InsertOutcome};
use crate::storage::repository::AttributionStore;

use migration::entities::click;

impl SeaOrmStorage {
    async fn insert_click_row(&self, new_click: Click) -> Result<InsertOutcome<Click>> {
        let db = &self.db;
        let model = click_to_active_model(&new_click);

        let inserted = retry::with_retry("insert_click", self.retry_config, || {
            let model = model.clone();
            async move {
                let result = click::Entity::insert(model)
                    .on_conflict(
                        OnConflict::column(click::Column::ClickId)
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(db)
                    .await;
                // PostgreSQL 冲突时报 RecordNotInserted
                match result {
                    Err(DbErr::RecordNotInserted) => Ok(0),
                    other => other,
                }
            }
        })
        .await?;

        if inserted > 0 {
            return Ok(InsertOutcome::Created(new_click));
        }

        debug!("Click {} already exists, reusing", new_click.click_id);
        let existing = self.find_click_row(&new_click.click_id).await?.ok_or_else(|| {
            ClickTrailError::database_operation(format!(
                "click {} 插入冲突但无法读取已有记录",
                new_click.click_id
            ))
        })?;
        Ok(InsertOutcome::Existing(existing))
    }

    async fn find_click_row(&self, click_id: &str) -> Result<Option<Click>> {
        let db = &self.db;
        let id = click_id.to_string();

        let model = retry::with_retry("find_click", self.retry_config, || {
            click::Entity::find_by_id(id.clone()).one(db)
        })
        .await?;

        Ok(model.map(model_to_click))
    }
}

#[async_trait]
impl AttributionStore for SeaOrmStorage {
    async fn insert_click(&self, click: Click) -> Result<InsertOutcome<Click>> {
        self.insert_click_row(click).await
    }

    async fn find_click(&self, click_id: &str) -> Result<Option<Click>> {
        self.find_click_row(click_id).await
    }

    async fn insert_event(&self, event: Event) -> Result<InsertOutcome<Event>> {
        self.insert_event_row(event).await
    }

    async fn find_event(&self, event_id: &str) -> Result<Option<Event>> {
        self.find_event_row(event_id).await
    }

    async fn claim_dispatch(&self, event_id: &str) -> Result<bool> {
        self.set_dispatched(event_id, true).await
    }

    async fn release_dispatch(&self, event_id: &str) -> Result<()> {
        self.set_dispatched(event_id, false).await.map(|_| ())
    }
}
