use async_trait::async_trait;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use super::converters::{delivery_to_active_model, model_to_delivery};
use super::{SeaOrmStorage, retry};
use crate::errors::Result;
use crate::storage::models::{DeliveryFilter, NewDelivery, PostbackDelivery};
use crate::storage::repository::DeliveryLogRepository;

use migration::entities::postback_delivery;

/// 单次查询最多返回的记录数
pub const MAX_DELIVERY_PAGE: u64 = 1000;
const DEFAULT_DELIVERY_PAGE: u64 = 100;

fn build_condition(filter: &DeliveryFilter) -> Condition {
    let mut condition = Condition::all();

    if let Some(profile_id) = filter.profile_id {
        condition = condition.add(postback_delivery::Column::ProfileId.eq(profile_id));
    }
    if let Some(status) = filter.status {
        condition = condition.add(postback_delivery::Column::Status.eq(status.to_string()));
    }
    if let Some(ref event_id) = filter.event_id {
        condition = condition.add(postback_delivery::Column::EventId.eq(event_id.clone()));
    }
    if let Some(ref click_id) = filter.click_id {
        condition = condition.add(postback_delivery::Column::ClickId.eq(click_id.clone()));
    }
    if let Some(ref chain_id) = filter.chain_id {
        condition = condition.add(postback_delivery::Column::ChainId.eq(chain_id.clone()));
    }
    if let Some(from) = filter.from {
        condition = condition.add(postback_delivery::Column::CreatedAt.gte(from));
    }
    if let Some(to) = filter.to {
        condition = condition.add(postback_delivery::Column::CreatedAt.lte(to));
    }

    condition
}

#[async_trait]
impl DeliveryLogRepository for SeaOrmStorage {
    async fn append(&self, record: NewDelivery) -> Result<PostbackDelivery> {
        let db = &self.db;
        let model = delivery_to_active_model(&record)?;

        let inserted = retry::with_retry("append_delivery", self.retry_config, || {
            postback_delivery::Entity::insert(model.clone()).exec_with_returning(db)
        })
        .await?;

        model_to_delivery(inserted)
    }

    async fn list(&self, filter: &DeliveryFilter) -> Result<Vec<PostbackDelivery>> {
        let db = &self.db;
        let condition = build_condition(filter);
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_DELIVERY_PAGE)
            .clamp(1, MAX_DELIVERY_PAGE);
        let offset = filter.offset.unwrap_or(0);

        let models = retry::with_retry("list_deliveries", self.retry_config, || {
            postback_delivery::Entity::find()
                .filter(condition.clone())
                .order_by_desc(postback_delivery::Column::CreatedAt)
                .order_by_desc(postback_delivery::Column::Id)
                .limit(limit)
                .offset(offset)
                .all(db)
        })
        .await?;

        models.into_iter().map(model_to_delivery).collect()
    }

    async fn get(&self, id: i64) -> Result<Option<PostbackDelivery>> {
        let db = &self.db;
        let model = retry::with_retry("get_delivery", self.retry_config, || {
            postback_delivery::Entity::find_by_id(id).one(db)
        })
        .await?;

        model.map(model_to_delivery).transpose()
    }
}
