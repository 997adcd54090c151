//! 持久化重试队列
//!
//! 任务通过删除来领取：只有删除成功的一方执行该次尝试，
//! 多个进程同时轮询也不会重复投递。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use tracing::{debug, warn};

use super::converters::{model_to_retry_job, retry_job_to_active_model};
use super::{SeaOrmStorage, retry};
use crate::errors::Result;
use crate::storage::models::{NewRetryJob, RetryJob};
use crate::storage::repository::RetryQueue;

use migration::entities::postback_retry_job;

#[async_trait]
impl RetryQueue for SeaOrmStorage {
    async fn schedule(&self, job: NewRetryJob) -> Result<RetryJob> {
        let db = &self.db;
        let model = retry_job_to_active_model(&job, Utc::now());

        let inserted = retry::with_retry("schedule_retry", self.retry_config, || {
            postback_retry_job::Entity::insert(model.clone()).exec_with_returning(db)
        })
        .await?;

        debug!(
            "Scheduled retry job {} (chain {}, attempt {}) due at {}",
            inserted.id, inserted.chain_id, inserted.attempt, inserted.due_at
        );
        Ok(model_to_retry_job(inserted))
    }

    async fn take_due(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<RetryJob>> {
        let db = &self.db;

        let candidates = retry::with_retry("find_due_retries", self.retry_config, || {
            postback_retry_job::Entity::find()
                .filter(postback_retry_job::Column::DueAt.lte(now))
                .order_by_asc(postback_retry_job::Column::DueAt)
                .order_by_asc(postback_retry_job::Column::Id)
                .limit(limit)
                .all(db)
        })
        .await?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for model in candidates {
            let id = model.id;
            match postback_retry_job::Entity::delete_by_id(id).exec(db).await {
                Ok(res) if res.rows_affected == 1 => claimed.push(model_to_retry_job(model)),
                Ok(_) => debug!("Retry job {} already claimed elsewhere", id),
                Err(e) => warn!("Failed to claim retry job {}: {}", id, e),
            }
        }

        Ok(claimed)
    }

    async fn pending_count(&self) -> Result<u64> {
        let db = &self.db;
        let count = retry::with_retry("count_retries", self.retry_config, || {
            postback_retry_job::Entity::find().count(db)
        })
        .await?;
        Ok(count)
    }
}
