//! Retry scheduler
//!
//! 轮询持久化重试队列，领取（删除）到期任务后交给执行器。
//! 领取到的尝试在独立任务中运行，轮询不等待它们结束，
//! 慢速端点不会拖住其他配置的到期重试。
//! 进程重启后未领取的任务仍在表中，会被继续执行。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::executor::DeliveryExecutor;
use crate::config::PostbackConfig;
use crate::errors::Result;
use crate::storage::models::{Click, Event, NewRetryJob, PostbackProfile, RetryJob};
use crate::storage::repository::{AttributionStore, ProfileRepository, RetryQueue};

pub struct RetryScheduler {
    queue: Arc<dyn RetryQueue>,
    store: Arc<dyn AttributionStore>,
    profiles: Arc<dyn ProfileRepository>,
    executor: DeliveryExecutor,
    poll_interval: Duration,
    batch_size: u64,
}

impl RetryScheduler {
    pub fn new(
        queue: Arc<dyn RetryQueue>,
        store: Arc<dyn AttributionStore>,
        profiles: Arc<dyn ProfileRepository>,
        executor: DeliveryExecutor,
        config: &PostbackConfig,
    ) -> Self {
        Self {
            queue,
            store,
            profiles,
            executor,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(10)),
            batch_size: config.poll_batch_size.max(1),
        }
    }

    /// 轮询直到关闭信号触发
    pub async fn run(&self) {
        let shutdown = self.executor.shutdown_signal().clone();
        info!(
            "Retry scheduler started (interval={:?}, batch={})",
            self.poll_interval, self.batch_size
        );

        while !shutdown.is_triggered() {
            match self.run_due(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => debug!("Retry scheduler ran {} due attempt(s)", n),
                Err(e) => error!("Retry scheduler poll failed: {}", e),
            }

            tokio::select! {
                _ = shutdown.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Retry scheduler stopped");
    }

    /// 领取 `now` 之前到期的任务并启动对应尝试，返回启动的尝试数
    ///
    /// 不等待尝试结束；关闭时由执行器的在途登记表负责收尾。
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize> {
        Ok(self.claim_due(now).await?.len())
    }

    /// 同 `run_due`，但等待本批尝试全部结束后返回
    pub async fn run_due_and_wait(&self, now: DateTime<Utc>) -> Result<usize> {
        let handles = self.claim_due(now).await?;
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Retry attempt task failed: {}", e);
            }
        }
        Ok(count)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<JoinHandle<()>>> {
        if self.executor.shutdown_signal().is_triggered() {
            return Ok(Vec::new());
        }

        let jobs = self.queue.take_due(now, self.batch_size).await?;
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            if self.executor.shutdown_signal().is_triggered() {
                self.requeue(&job).await;
                continue;
            }

            match self.load(&job).await {
                Ok(Some((profile, event, click))) => {
                    handles.push(self.executor.spawn_attempt(
                        profile,
                        event,
                        click,
                        job.chain_id.clone(),
                        job.attempt,
                    ));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to load retry job {}: {}", job.id, e);
                    self.requeue(&job).await;
                }
            }
        }

        Ok(handles)
    }

    /// 读取任务关联的配置、事件与点击；任一缺失或配置已禁用时丢弃该链
    async fn load(&self, job: &RetryJob) -> Result<Option<(PostbackProfile, Event, Click)>> {
        let Some(profile) = self.profiles.get_profile(job.profile_id).await? else {
            warn!(
                "Dropping retry of chain {}: profile {} no longer exists",
                job.chain_id, job.profile_id
            );
            return Ok(None);
        };
        if !profile.enabled {
            info!(
                "Dropping retry of chain {}: profile {} is disabled",
                job.chain_id, profile.id
            );
            return Ok(None);
        }

        let Some(event) = self.store.find_event(&job.event_id).await? else {
            warn!(
                "Dropping retry of chain {}: event {} not found",
                job.chain_id, job.event_id
            );
            return Ok(None);
        };
        let Some(click) = self.store.find_click(&event.click_id).await? else {
            warn!(
                "Dropping retry of chain {}: click {} not found",
                job.chain_id, event.click_id
            );
            return Ok(None);
        };

        Ok(Some((profile, event, click)))
    }

    /// 已领取但未执行的任务放回队列
    async fn requeue(&self, job: &RetryJob) {
        let result = self
            .queue
            .schedule(NewRetryJob {
                chain_id: job.chain_id.clone(),
                profile_id: job.profile_id,
                event_id: job.event_id.clone(),
                attempt: job.attempt,
                due_at: job.due_at,
            })
            .await;
        if let Err(e) = result {
            error!(
                "Failed to requeue attempt {} of chain {}: {}",
                job.attempt, job.chain_id, e
            );
        }
    }
}
