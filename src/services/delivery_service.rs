//! Delivery log service
//!
//! 查询投递日志与手动重试，HTTP 接口与 CLI 共用。

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::errors::{ClickTrailError, Result};
use crate::postback::DeliveryExecutor;
use crate::storage::models::{
    Click, DeliveryFilter, Event, NewRetryJob, PostbackDelivery, PostbackProfile, RetryJob,
};
use crate::storage::repository::{
    AttributionStore, DeliveryLogRepository, ProfileRepository, RetryQueue,
};

/// 手动重试的结果
#[derive(Debug, Clone)]
pub struct RetryTriggered {
    pub delivery_id: i64,
    pub chain_id: String,
}

pub struct DeliveryService {
    log: Arc<dyn DeliveryLogRepository>,
    profiles: Arc<dyn ProfileRepository>,
    store: Arc<dyn AttributionStore>,
    queue: Arc<dyn RetryQueue>,
    executor: Option<DeliveryExecutor>,
}

impl DeliveryService {
    pub fn new(
        log: Arc<dyn DeliveryLogRepository>,
        profiles: Arc<dyn ProfileRepository>,
        store: Arc<dyn AttributionStore>,
        queue: Arc<dyn RetryQueue>,
        executor: Option<DeliveryExecutor>,
    ) -> Self {
        Self {
            log,
            profiles,
            store,
            queue,
            executor,
        }
    }

    pub async fn list(&self, filter: &DeliveryFilter) -> Result<Vec<PostbackDelivery>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to)
            && from > to
        {
            return Err(ClickTrailError::validation("from 不能晚于 to"));
        }
        self.log.list(filter).await
    }

    pub async fn get(&self, id: i64) -> Result<PostbackDelivery> {
        self.log
            .get(id)
            .await?
            .ok_or_else(|| ClickTrailError::not_found(format!("投递记录 {} 不存在", id)))
    }

    /// 读取投递记录对应的配置、事件与点击
    async fn load_chain_inputs(&self, id: i64) -> Result<(PostbackProfile, Event, Click)> {
        let delivery = self.get(id).await?;

        let profile = self
            .profiles
            .get_profile(delivery.profile_id)
            .await?
            .ok_or_else(|| {
                ClickTrailError::not_found(format!(
                    "回传配置 {} 不存在",
                    delivery.profile_id
                ))
            })?;
        let event = self
            .store
            .find_event(&delivery.event_id)
            .await?
            .ok_or_else(|| {
                ClickTrailError::not_found(format!("事件 {} 不存在", delivery.event_id))
            })?;
        let click = self
            .store
            .find_click(&event.click_id)
            .await?
            .ok_or_else(|| {
                ClickTrailError::not_found(format!("click {} 不存在", event.click_id))
            })?;

        Ok((profile, event, click))
    }

    /// 以新的 chain 从第 1 次尝试重新投递
    ///
    /// 有执行器时立即在本进程执行，否则写入重试队列由运行中的服务领取。
    pub async fn retry(&self, id: i64) -> Result<RetryTriggered> {
        let (profile, event, click) = self.load_chain_inputs(id).await?;

        let chain_id = match self.executor {
            Some(ref executor) => executor.start_chain(profile, event, click),
            None => self.enqueue(&profile, &event).await?.chain_id,
        };

        info!("Manual retry of delivery {} started chain {}", id, chain_id);
        Ok(RetryTriggered {
            delivery_id: id,
            chain_id,
        })
    }

    async fn enqueue(&self, profile: &PostbackProfile, event: &Event) -> Result<RetryJob> {
        self.queue
            .schedule(NewRetryJob {
                chain_id: Uuid::new_v4().to_string(),
                profile_id: profile.id,
                event_id: event.event_id.clone(),
                attempt: 1,
                due_at: Utc::now(),
            })
            .await
    }
}
