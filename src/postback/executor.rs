//! Delivery executor
//!
//! 每个匹配的配置是一条独立的投递链（chain），每次尝试：
//! 渲染请求 → 发送 → 分类 → 写一行投递日志 → 需要重试时写入持久化重试队列。
//! 重试一律经由 `RetryQueue`，由 `RetryScheduler` 领取执行。
//! 关闭超时仍未结束的尝试以相同序号重新入队，重启后重发（至少一次）。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use dashmap::{DashMap, DashSet};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::matcher::match_profiles;
use super::policy::{AttemptDecision, next_state};
use super::request::{RequestSettings, build_request};
use super::template::RenderContext;
use super::transport::{PostbackTransport, classify_outcome};
use crate::config::PostbackConfig;
use crate::errors::Result;
use crate::storage::models::{
    Click, DeliveryStatus, Event, NewDelivery, NewRetryJob, PostbackDelivery, PostbackProfile,
};
use crate::storage::repository::{DeliveryLogRepository, ProfileRepository, RetryQueue};
use crate::utils::truncate_chars;

/// 事件写入后的投递入口
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// 匹配配置并异步投递，返回启动的投递链数量
    async fn dispatch(&self, event: &Event, click: &Click) -> Result<usize>;
}

/// 执行器参数
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub request: RequestSettings,
    pub jitter_ratio: f64,
    pub response_body_limit: usize,
}

impl ExecutorSettings {
    pub fn from_config(config: &PostbackConfig) -> Self {
        Self {
            request: RequestSettings {
                user_agent: config.user_agent.clone(),
                default_timeout_ms: config.default_timeout_ms,
            },
            jitter_ratio: config.jitter_ratio,
            response_body_limit: config.response_body_limit,
        }
    }
}

/// 关闭信号
///
/// 触发后调度器不再领取任务，执行器仍会持久化新产生的重试任务。
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// 等待触发（已触发时仍需配合 `is_triggered` 检查）
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

/// 在途尝试，足以在放弃时重新入队
#[derive(Debug, Clone)]
struct InFlightAttempt {
    chain_id: String,
    profile_id: i64,
    event_id: String,
    attempt: u32,
}

/// 在途尝试登记表
///
/// `settled` 记录已决定后续去向的尝试：尝试本身拿到结果，
/// 或关闭超时被放弃并重新入队，两者只有先到的一方生效。
#[derive(Default)]
struct InFlight {
    tasks: DashMap<u64, InFlightAttempt>,
    settled: DashSet<u64>,
    next_id: AtomicU64,
    idle: Notify,
}

struct InFlightGuard {
    registry: Arc<InFlight>,
    id: u64,
}

impl InFlight {
    fn enter(self: &Arc<Self>, attempt: InFlightAttempt) -> InFlightGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.insert(id, attempt);
        InFlightGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    /// 认领尝试的后续去向，首次调用返回 true
    fn settle(&self, id: u64) -> bool {
        self.settled.insert(id)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.tasks.remove(&self.id);
        self.registry.settled.remove(&self.id);
        if self.registry.tasks.is_empty() {
            self.registry.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct DeliveryExecutor {
    profiles: Arc<dyn ProfileRepository>,
    log: Arc<dyn DeliveryLogRepository>,
    queue: Arc<dyn RetryQueue>,
    transport: Arc<dyn PostbackTransport>,
    settings: ExecutorSettings,
    in_flight: Arc<InFlight>,
    shutdown: ShutdownSignal,
}

impl DeliveryExecutor {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        log: Arc<dyn DeliveryLogRepository>,
        queue: Arc<dyn RetryQueue>,
        transport: Arc<dyn PostbackTransport>,
        settings: ExecutorSettings,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            profiles,
            log,
            queue,
            transport,
            settings,
            in_flight: Arc::new(InFlight::default()),
            shutdown,
        }
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// 当前在途尝试数
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.tasks.len()
    }

    /// 以新的 chain 从第 1 次尝试开始投递（手动重试）
    pub fn start_chain(&self, profile: PostbackProfile, event: Event, click: Click) -> String {
        let chain_id = Uuid::new_v4().to_string();
        info!(
            "Starting postback chain {} (profile={}, event={})",
            chain_id, profile.id, event.event_id
        );
        self.spawn_attempt(profile, event, click, chain_id.clone(), 1);
        chain_id
    }

    /// 在独立任务中执行一次尝试
    pub(super) fn spawn_attempt(
        &self,
        profile: PostbackProfile,
        event: Event,
        click: Click,
        chain_id: String,
        attempt: u32,
    ) -> JoinHandle<()> {
        let guard = self.in_flight.enter(InFlightAttempt {
            chain_id: chain_id.clone(),
            profile_id: profile.id,
            event_id: event.event_id.clone(),
            attempt,
        });
        let this = self.clone();
        tokio::spawn(async move {
            let ticket = guard.id;
            let _guard = guard;
            if let Err(e) = this
                .run_attempt(&profile, &event, &click, &chain_id, attempt, ticket)
                .await
            {
                error!(
                    "Postback attempt {} of chain {} could not be recorded: {}",
                    attempt, chain_id, e
                );
            }
        })
    }

    /// 执行一次尝试并写入恰好一行投递日志
    ///
    /// 日志先于重试任务写入；关闭期间产生的重试任务同样持久化。
    /// 已被 `abandon_in_flight` 重新入队的尝试只写日志，不再安排后续。
    #[instrument(skip(self, profile, event, click, ticket), fields(profile_id = profile.id))]
    async fn run_attempt(
        &self,
        profile: &PostbackProfile,
        event: &Event,
        click: &Click,
        chain_id: &str,
        attempt: u32,
        ticket: u64,
    ) -> Result<PostbackDelivery> {
        let max_attempts = profile.retries.max(1);
        let ctx = RenderContext::new(event, click);

        let mut record = NewDelivery {
            chain_id: chain_id.to_string(),
            profile_id: profile.id,
            event_id: event.event_id.clone(),
            click_id: click.click_id.clone(),
            attempt,
            max_attempts,
            status: DeliveryStatus::RenderError,
            request_method: profile.method,
            request_url: profile.endpoint_url_template.clone(),
            request_body: None,
            request_headers: Vec::new(),
            response_code: None,
            response_body: None,
            error: None,
            duration_ms: 0,
            next_retry_at: None,
            created_at: Utc::now(),
        };

        let decision = match build_request(profile, &ctx, &self.settings.request) {
            Ok(request) => {
                record.request_url = request.url.clone();
                record.request_body = request.body.clone();
                record.request_headers = request.logged_headers();

                let started = Instant::now();
                let result = self.transport.send(&request).await;
                record.duration_ms = started.elapsed().as_millis() as u64;
                record.status = classify_outcome(&result);

                match result {
                    Ok(resp) => {
                        record.response_code = Some(resp.status);
                        record.response_body = Some(truncate_chars(
                            &resp.body,
                            self.settings.response_body_limit,
                        ));
                    }
                    Err(e) => record.error = Some(e.to_string()),
                }

                next_state(
                    record.status,
                    attempt,
                    max_attempts,
                    profile.backoff_base_sec,
                    self.settings.jitter_ratio,
                )
            }
            // 渲染失败不会因重试而改变
            Err(e) => {
                record.error = Some(e.to_string());
                AttemptDecision::Done
            }
        };

        record.created_at = Utc::now();
        let decision = if self.in_flight.settle(ticket) {
            decision
        } else {
            warn!(
                "Attempt {} of chain {} finished after it was requeued at shutdown",
                attempt, chain_id
            );
            AttemptDecision::Done
        };
        let retry = match decision {
            AttemptDecision::Retry {
                next_attempt,
                delay,
            } => {
                let due_at =
                    record.created_at + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
                record.next_retry_at = Some(due_at);
                Some((next_attempt, due_at))
            }
            AttemptDecision::Done => None,
        };

        let row = self.log.append(record).await?;

        match row.status {
            DeliveryStatus::Success => info!(
                "Postback chain {} attempt {}/{} delivered ({:?})",
                chain_id, attempt, max_attempts, row.response_code
            ),
            DeliveryStatus::HttpError => warn!(
                "Postback chain {} attempt {}/{} got HTTP {:?}, not retrying",
                chain_id, attempt, max_attempts, row.response_code
            ),
            DeliveryStatus::TransportError => warn!(
                "Postback chain {} attempt {}/{} failed: {}",
                chain_id,
                attempt,
                max_attempts,
                row.error.as_deref().unwrap_or("unknown error")
            ),
            DeliveryStatus::RenderError => error!(
                "Postback chain {} could not render a request for profile {}: {}",
                chain_id,
                profile.id,
                row.error.as_deref().unwrap_or("unknown error")
            ),
        }

        if let Some((next_attempt, due_at)) = retry {
            self.queue
                .schedule(NewRetryJob {
                    chain_id: chain_id.to_string(),
                    profile_id: profile.id,
                    event_id: event.event_id.clone(),
                    attempt: next_attempt,
                    due_at,
                })
                .await?;
            debug!(
                "Scheduled attempt {} of chain {} at {}",
                next_attempt, chain_id, due_at
            );
        }

        Ok(row)
    }

    /// 放弃仍在途的尝试：以相同尝试序号立即重新入队，返回涉及的 chain_id
    ///
    /// 关闭等待超时后调用。之后才结束的尝试仍会写日志，但不再安排重试。
    pub async fn abandon_in_flight(&self) -> Vec<String> {
        let pending: Vec<(u64, InFlightAttempt)> = self
            .in_flight
            .tasks
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut abandoned = Vec::with_capacity(pending.len());
        for (ticket, task) in pending {
            if !self.in_flight.settle(ticket) {
                continue;
            }
            let job = NewRetryJob {
                chain_id: task.chain_id.clone(),
                profile_id: task.profile_id,
                event_id: task.event_id.clone(),
                attempt: task.attempt,
                due_at: Utc::now(),
            };
            match self.queue.schedule(job).await {
                Ok(_) => error!(
                    "Abandoned attempt {} of chain {} (profile={}, event={}), requeued",
                    task.attempt, task.chain_id, task.profile_id, task.event_id
                ),
                Err(e) => error!(
                    "Abandoned attempt {} of chain {} (profile={}, event={}) could not be requeued: {}",
                    task.attempt, task.chain_id, task.profile_id, task.event_id, e
                ),
            }
            abandoned.push(task.chain_id);
        }
        abandoned
    }

    /// 等待所有在途尝试完成，超时返回 false
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.in_flight.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight.tasks.is_empty() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl EventDispatcher for DeliveryExecutor {
    async fn dispatch(&self, event: &Event, click: &Click) -> Result<usize> {
        let chain = click.scope_chain();
        let candidates = self.profiles.list_matching(&chain).await?;
        let matched = match_profiles(candidates, &chain, event.revenue);

        debug!(
            "Event {} matched {} postback profile(s)",
            event.event_id,
            matched.len()
        );

        let count = matched.len();
        for profile in matched {
            let chain_id = Uuid::new_v4().to_string();
            self.spawn_attempt(profile, event.clone(), click.clone(), chain_id, 1);
        }
        Ok(count)
    }
}
