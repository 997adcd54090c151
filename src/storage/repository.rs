//! 存储层对外暴露的窄接口
//!
//! 引擎只通过这些 trait 访问数据，`SeaOrmStorage` 实现全部接口，
//! 测试可以替换为内存实现。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    Click, DeliveryFilter, Event, InsertOutcome, NewDelivery, NewRetryJob, PostbackDelivery,
    PostbackProfile, RetryJob, ScopeChain,
};
use crate::errors::Result;

/// 点击与事件的归因存储
#[async_trait]
pub trait AttributionStore: Send + Sync {
    /// 幂等插入点击；click_id 已存在时返回已有记录
    async fn insert_click(&self, click: Click) -> Result<InsertOutcome<Click>>;

    async fn find_click(&self, click_id: &str) -> Result<Option<Click>>;

    /// 幂等插入事件；(click_id, type, txid) 已存在时返回已有记录
    async fn insert_event(&self, event: Event) -> Result<InsertOutcome<Event>>;

    async fn find_event(&self, event_id: &str) -> Result<Option<Event>>;

    /// 领取事件的投递权，事件尚未派发过时返回 true
    ///
    /// 并发的重复提交中只有一方能领取成功。
    async fn claim_dispatch(&self, event_id: &str) -> Result<bool>;

    /// 派发失败后归还投递权，之后的重复提交会重新派发
    async fn release_dispatch(&self, event_id: &str) -> Result<()>;
}

/// 回传配置仓库（只读）
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// 返回作用域与归因链匹配的已启用配置（未排序）
    async fn list_matching(&self, chain: &ScopeChain) -> Result<Vec<PostbackProfile>>;

    async fn get_profile(&self, id: i64) -> Result<Option<PostbackProfile>>;
}

/// 投递日志（只追加）
#[async_trait]
pub trait DeliveryLogRepository: Send + Sync {
    async fn append(&self, record: NewDelivery) -> Result<PostbackDelivery>;

    async fn list(&self, filter: &DeliveryFilter) -> Result<Vec<PostbackDelivery>>;

    async fn get(&self, id: i64) -> Result<Option<PostbackDelivery>>;
}

/// 持久化重试队列
#[async_trait]
pub trait RetryQueue: Send + Sync {
    async fn schedule(&self, job: NewRetryJob) -> Result<RetryJob>;

    /// 领取到期任务：删除成功的任务才归调用方执行
    async fn take_due(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<RetryJob>>;

    async fn pending_count(&self) -> Result<u64>;
}

/// 落地页解析
#[async_trait]
pub trait LandingResolver: Send + Sync {
    /// 解析 offer 的落地页，offer 不存在或已禁用时返回 None
    async fn offer_landing(&self, offer_id: &str) -> Result<Option<String>>;
}
