use async_trait::async_trait;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};
use tracing::warn;

use super::converters::{model_to_profile, profile_to_active_model};
use super::{SeaOrmStorage, retry};
use crate::errors::Result;
use crate::storage::models::{PostbackProfile, ScopeChain};
use crate::storage::repository::ProfileRepository;

use migration::entities::postback_profile;

/// 转换并丢弃作用域不合法的配置
fn convert_profiles(models: Vec<postback_profile::Model>) -> Vec<PostbackProfile> {
    models
        .into_iter()
        .filter_map(|model| {
            let id = model.id;
            match model_to_profile(model) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!("Skipping invalid postback profile {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

impl SeaOrmStorage {
    /// 列出全部回传配置（包括禁用的）
    pub async fn list_profiles(&self) -> Result<Vec<PostbackProfile>> {
        let db = &self.db;
        let models = retry::with_retry("list_profiles", self.retry_config, || {
            postback_profile::Entity::find()
                .order_by_asc(postback_profile::Column::Id)
                .all(db)
        })
        .await?;

        Ok(convert_profiles(models))
    }

    /// 写入回传配置，返回带数据库 id 的配置
    pub async fn insert_profile(&self, profile: &PostbackProfile) -> Result<PostbackProfile> {
        let model = profile_to_active_model(profile)?;
        let inserted = postback_profile::Entity::insert(model)
            .exec_with_returning(&self.db)
            .await?;
        model_to_profile(inserted)
    }
}

#[async_trait]
impl ProfileRepository for SeaOrmStorage {
    async fn list_matching(&self, chain: &ScopeChain) -> Result<Vec<PostbackProfile>> {
        let db = &self.db;

        let mut scope_condition =
            Condition::any().add(postback_profile::Column::ScopeType.eq("global"));
        for (scope_type, scope_id) in [
            ("flow", &chain.flow_id),
            ("offer", &chain.offer_id),
            ("campaign", &chain.campaign_id),
        ] {
            if let Some(id) = scope_id {
                scope_condition = scope_condition.add(
                    Condition::all()
                        .add(postback_profile::Column::ScopeType.eq(scope_type))
                        .add(postback_profile::Column::ScopeId.eq(id.clone())),
                );
            }
        }

        let models = retry::with_retry("list_matching_profiles", self.retry_config, || {
            postback_profile::Entity::find()
                .filter(postback_profile::Column::Enabled.eq(true))
                .filter(scope_condition.clone())
                .all(db)
        })
        .await?;

        Ok(convert_profiles(models)
            .into_iter()
            .filter(|p| p.scope.matches(chain))
            .collect())
    }

    async fn get_profile(&self, id: i64) -> Result<Option<PostbackProfile>> {
        let db = &self.db;
        let model = retry::with_retry("get_profile", self.retry_config, || {
            postback_profile::Entity::find_by_id(id).one(db)
        })
        .await?;

        model.map(model_to_profile).transpose()
    }
}
