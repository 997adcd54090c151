use async_trait::async_trait;
use sea_orm::EntityTrait;
use sea_orm::sea_query::OnConflict;

use super::converters::model_to_offer;
use super::{SeaOrmStorage, retry};
use crate::errors::Result;
use crate::storage::models::Offer;
use crate::storage::repository::LandingResolver;

use migration::entities::offer;

impl SeaOrmStorage {
    pub async fn find_offer(&self, offer_id: &str) -> Result<Option<Offer>> {
        let db = &self.db;
        let id = offer_id.to_string();
        let model = retry::with_retry("find_offer", self.retry_config, || {
            offer::Entity::find_by_id(id.clone()).one(db)
        })
        .await?;
        Ok(model.map(model_to_offer))
    }

    /// 写入或更新 offer（管理端与测试使用）
    pub async fn upsert_offer(&self, item: &Offer) -> Result<()> {
        use sea_orm::ActiveValue::Set;

        let model = offer::ActiveModel {
            id: Set(item.id.clone()),
            name: Set(item.name.clone()),
            landing_url: Set(item.landing_url.clone()),
            enabled: Set(item.enabled),
            created_at: Set(item.created_at),
        };

        offer::Entity::insert(model)
            .on_conflict(
                OnConflict::column(offer::Column::Id)
                    .update_columns([
                        offer::Column::Name,
                        offer::Column::LandingUrl,
                        offer::Column::Enabled,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LandingResolver for SeaOrmStorage {
    async fn offer_landing(&self, offer_id: &str) -> Result<Option<String>> {
        Ok(self
            .find_offer(offer_id)
            .await?
            .filter(|o| o.enabled && !o.landing_url.trim().is_empty())
            .map(|o| o.landing_url))
    }
}
