//! 回传投递引擎端到端测试
//!
//! 事件写入 → 配置匹配 → 请求渲染 → 传输 → 投递日志 → 重试队列。
//! 传输层使用可编排的假实现，不发出真实网络请求。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, web};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::join_all;
use migration::entities::{event, postback_profile};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::Value;
use tempfile::TempDir;

use clicktrail::api::configure_routes;
use clicktrail::config::{ApiConfig, DatabaseConfig, StaticConfig, init_config};
use clicktrail::errors::{ClickTrailError, Result};
use clicktrail::postback::{
    DeliveryExecutor, ExecutorSettings, PostbackRequest, PostbackTransport, ShutdownSignal,
    TransportError, TransportResponse, TransportResult,
};
use clicktrail::runtime::lifetime::{AppContext, Collaborators};
use clicktrail::services::{EventRequest, EventService, EventStatus, GeoResolver, UserAgentParser};
use clicktrail::storage::models::{
    Click, DeliveryFilter, DeliveryStatus, DeviceInfo, GeoInfo, HttpMethod, NewRetryJob,
    PostbackDelivery, PostbackProfile, Scope, ScopeChain,
};
use clicktrail::storage::{
    AttributionStore, DeliveryLogRepository, ProfileRepository, RetryQueue, SeaOrmStorage,
};

// =============================================================================
// Test Setup
// =============================================================================

static INIT: Once = Once::new();

fn init_static_config() {
    INIT.call_once(|| {
        init_config();
    });
}

struct NoGeo;

#[async_trait]
impl GeoResolver for NoGeo {
    async fn lookup(&self, _ip: &str) -> Option<GeoInfo> {
        None
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

struct NoUserAgent;

impl UserAgentParser for NoUserAgent {
    fn parse(&self, _user_agent: &str) -> DeviceInfo {
        DeviceInfo::default()
    }
}

/// 假传输层的单次响应
#[derive(Clone)]
enum Reply {
    Status(u16),
    Fail,
}

/// 按主机固定应答，可附带延迟
struct Route {
    host: &'static str,
    delay: Duration,
    reply: Reply,
}

/// 按顺序返回预设响应，用完后重复最后一个；命中 `routes` 的请求按路由应答
struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    routes: Vec<Route>,
    requests: Mutex<Vec<PostbackRequest>>,
}

impl ScriptedTransport {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Self::build(replies, Vec::new())
    }

    fn routed(routes: Vec<Route>) -> Arc<Self> {
        Self::build(Vec::new(), routes)
    }

    fn build(replies: Vec<Reply>, routes: Vec<Route>) -> Arc<Self> {
        let fallback = replies.last().cloned().unwrap_or(Reply::Status(200));
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback,
            routes,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<PostbackRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostbackTransport for ScriptedTransport {
    async fn send(&self, request: &PostbackRequest) -> TransportResult {
        self.requests.lock().unwrap().push(request.clone());
        let reply = match self.routes.iter().find(|r| request.url.contains(r.host)) {
            Some(route) => {
                tokio::time::sleep(route.delay).await;
                route.reply.clone()
            }
            None => self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone()),
        };
        match reply {
            Reply::Status(status) => Ok(TransportResponse {
                status,
                body: format!("status {}", status),
            }),
            Reply::Fail => Err(TransportError::new("connection refused")),
        }
    }
}

struct TestEnv {
    _dir: TempDir,
    context: AppContext,
    transport: Arc<ScriptedTransport>,
}

async fn setup(replies: Vec<Reply>) -> TestEnv {
    setup_with(ScriptedTransport::new(replies), StaticConfig::default()).await
}

async fn setup_with(transport: Arc<ScriptedTransport>, config: StaticConfig) -> TestEnv {
    init_static_config();

    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("postback_test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let storage = Arc::new(
        SeaOrmStorage::with_config(&db_url, "sqlite", &DatabaseConfig::default())
            .await
            .expect("Failed to create storage"),
    );

    let collaborators = Collaborators {
        transport: transport.clone(),
        geo: Arc::new(NoGeo),
        user_agents: Arc::new(NoUserAgent),
    };
    let context = AppContext::build(storage.clone(), collaborators, &config);

    let click = Click {
        click_id: "CLK1".to_string(),
        offer_id: Some("42".to_string()),
        campaign_id: Some("c1".to_string()),
        created_at: Utc::now(),
        ..Default::default()
    };
    storage
        .insert_click(click)
        .await
        .expect("Failed to insert click");

    TestEnv {
        _dir: dir,
        context,
        transport,
    }
}

fn profile(name: &str, scope: Scope) -> PostbackProfile {
    PostbackProfile {
        id: 0,
        name: name.to_string(),
        owner_id: None,
        scope,
        priority: 0,
        enabled: true,
        method: HttpMethod::Get,
        endpoint_url_template: "https://pb.example.com/".to_string(),
        params_template: vec![
            ("clickid".to_string(), "{{clickid}}".to_string()),
            ("status".to_string(), "{{status}}".to_string()),
            ("amount".to_string(), "{{revenue}}".to_string()),
        ],
        body_template: None,
        status_map: [("deposit".to_string(), "sale".to_string())]
            .into_iter()
            .collect(),
        filter_revenue_gt0: false,
        auth: Default::default(),
        hmac: Default::default(),
        retries: 1,
        backoff_base_sec: 2,
        timeout_ms: 4000,
        url_encode: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn profile_at(name: &str, endpoint: &str, retries: u32) -> PostbackProfile {
    let mut p = profile(name, Scope::Global);
    p.endpoint_url_template = endpoint.to_string();
    p.retries = retries;
    p
}

fn deposit(revenue: Option<f64>) -> EventRequest {
    EventRequest {
        clickid: "CLK1".to_string(),
        event_type: "deposit".to_string(),
        revenue,
        ..Default::default()
    }
}

impl TestEnv {
    async fn add_profile(&self, profile: PostbackProfile) -> PostbackProfile {
        self.context
            .storage
            .insert_profile(&profile)
            .await
            .expect("Failed to insert profile")
    }

    async fn settle(&self) {
        assert!(
            self.context.executor.wait_idle(Duration::from_secs(5)).await,
            "postback attempts did not finish"
        );
    }

    /// 按尝试序号排序的投递日志
    async fn deliveries(&self) -> Vec<PostbackDelivery> {
        let mut rows = self
            .context
            .storage
            .list(&DeliveryFilter::default())
            .await
            .unwrap();
        rows.sort_by_key(|r| (r.chain_id.clone(), r.attempt));
        rows
    }

    async fn pending(&self) -> u64 {
        self.context.storage.pending_count().await.unwrap()
    }

    /// 执行 `at` 之前到期的重试并等待其结束
    async fn run_retries(&self, at: DateTime<Utc>) -> usize {
        self.context.scheduler.run_due_and_wait(at).await.unwrap()
    }
}

fn retry_delay_ms(row: &PostbackDelivery) -> i64 {
    let next = row.next_retry_at.expect("next_retry_at missing");
    (next - row.created_at).num_milliseconds()
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test]
async fn test_deposit_delivers_rendered_get() {
    let env = setup(vec![Reply::Status(200)]).await;
    let p = env.add_profile(profile("offer-42", Scope::Offer("42".into()))).await;

    let result = env
        .context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    assert_eq!(result.status, EventStatus::Success);
    env.settle().await;

    let requests = env.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url,
        "https://pb.example.com/?clickid=CLK1&status=sale&amount=50"
    );

    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.profile_id, p.id);
    assert_eq!(row.event_id, result.event.event_id);
    assert_eq!(row.status, DeliveryStatus::Success);
    assert_eq!(row.attempt, 1);
    assert_eq!(row.response_code, Some(200));
    assert!(row.next_retry_at.is_none());
    assert_eq!(env.pending().await, 0);
}

#[tokio::test]
async fn test_duplicate_event_is_not_redelivered() {
    let env = setup(vec![Reply::Status(200)]).await;
    env.add_profile(profile("global", Scope::Global)).await;

    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    env.settle().await;

    let again = env
        .context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    assert_eq!(again.status, EventStatus::Duplicate);
    env.settle().await;

    assert_eq!(env.transport.requests().len(), 1);
    assert_eq!(env.deliveries().await.len(), 1);
}

#[tokio::test]
async fn test_http_error_is_terminal() {
    let env = setup(vec![Reply::Status(500)]).await;
    let mut p = profile("global", Scope::Global);
    p.retries = 3;
    env.add_profile(p).await;

    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    env.settle().await;

    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DeliveryStatus::HttpError);
    assert_eq!(rows[0].response_code, Some(500));
    assert!(rows[0].next_retry_at.is_none());
    assert_eq!(env.pending().await, 0);
}

#[tokio::test]
async fn test_transport_failures_follow_backoff_schedule() {
    let env = setup(vec![Reply::Fail]).await;
    let mut p = profile("global", Scope::Global);
    p.retries = 3;
    p.backoff_base_sec = 2;
    env.add_profile(p).await;

    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    env.settle().await;

    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DeliveryStatus::TransportError);
    let first_delay = retry_delay_ms(&rows[0]);
    assert!((1999..=2401).contains(&first_delay), "delay {}", first_delay);
    assert_eq!(env.pending().await, 1);

    // 未到期的任务不会被领取
    assert_eq!(env.run_retries(Utc::now()).await, 0);

    let later = Utc::now() + TimeDelta::hours(1);
    assert_eq!(env.run_retries(later).await, 1);
    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 2);
    let second_delay = retry_delay_ms(&rows[1]);
    assert!((3999..=4801).contains(&second_delay), "delay {}", second_delay);

    assert_eq!(env.run_retries(later).await, 1);
    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].attempt, 3);
    assert_eq!(rows[2].max_attempts, 3);
    assert!(rows[2].next_retry_at.is_none());
    assert!(rows.iter().all(|r| r.chain_id == rows[0].chain_id));
    assert_eq!(env.pending().await, 0);
    assert_eq!(env.transport.requests().len(), 3);
}

#[tokio::test]
async fn test_retry_succeeds_after_transient_failure() {
    let env = setup(vec![Reply::Fail, Reply::Status(204)]).await;
    let mut p = profile("global", Scope::Global);
    p.retries = 3;
    env.add_profile(p).await;

    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    env.settle().await;

    let later = Utc::now() + TimeDelta::hours(1);
    assert_eq!(env.run_retries(later).await, 1);

    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].status, DeliveryStatus::Success);
    assert_eq!(rows[1].response_code, Some(204));
    assert_eq!(env.pending().await, 0);
}

#[tokio::test]
async fn test_revenue_filter_skips_profile() {
    let env = setup(vec![Reply::Status(200)]).await;
    let mut filtered = profile("revenue-only", Scope::Campaign("c1".into()));
    filtered.filter_revenue_gt0 = true;
    env.add_profile(filtered).await;
    let plain = env.add_profile(profile("global", Scope::Global)).await;

    env.context
        .event_service
        .record(deposit(None))
        .await
        .unwrap();
    env.settle().await;

    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].profile_id, plain.id);
    // 无 revenue 时 amount 渲染为空
    assert_eq!(
        env.transport.requests()[0].url,
        "https://pb.example.com/?clickid=CLK1&status=sale&amount="
    );
}

#[tokio::test]
async fn test_unmatched_scope_is_not_delivered() {
    let env = setup(vec![Reply::Status(200)]).await;
    env.add_profile(profile("other-offer", Scope::Offer("7".into())))
        .await;
    let mut disabled = profile("disabled", Scope::Global);
    disabled.enabled = false;
    env.add_profile(disabled).await;

    env.context
        .event_service
        .record(deposit(Some(10.0)))
        .await
        .unwrap();
    env.settle().await;

    assert!(env.deliveries().await.is_empty());
    assert!(env.transport.requests().is_empty());
}

#[tokio::test]
async fn test_manual_retry_starts_new_chain() {
    let env = setup(vec![Reply::Status(500), Reply::Status(200)]).await;
    env.add_profile(profile("global", Scope::Global)).await;

    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    env.settle().await;

    let original = env.deliveries().await.remove(0);
    assert_eq!(original.status, DeliveryStatus::HttpError);

    let triggered = env
        .context
        .delivery_service
        .retry(original.id)
        .await
        .unwrap();
    assert_ne!(triggered.chain_id, original.chain_id);
    env.settle().await;

    let chain = env
        .context
        .storage
        .list(&DeliveryFilter {
            chain_id: Some(triggered.chain_id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].attempt, 1);
    assert_eq!(chain[0].status, DeliveryStatus::Success);

    // 原始记录保持不变
    let reloaded = env.context.delivery_service.get(original.id).await.unwrap();
    assert_eq!(reloaded, original);
}

#[tokio::test]
async fn test_manual_retry_unknown_delivery() {
    let env = setup(vec![]).await;
    let err = env.context.delivery_service.retry(9999).await.unwrap_err();
    assert_eq!(err.http_status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_shutdown_leaves_jobs_pending() {
    let env = setup(vec![Reply::Fail]).await;
    let mut p = profile("global", Scope::Global);
    p.retries = 2;
    env.add_profile(p).await;

    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    env.settle().await;
    assert_eq!(env.pending().await, 1);

    env.context.executor.shutdown_signal().trigger();
    let later = Utc::now() + TimeDelta::hours(1);
    assert_eq!(env.run_retries(later).await, 0);
    assert_eq!(env.pending().await, 1);
    assert_eq!(env.deliveries().await.len(), 1);
}

#[tokio::test]
async fn test_retry_dropped_when_profile_disabled() {
    let env = setup(vec![Reply::Fail]).await;
    let mut p = profile("global", Scope::Global);
    p.retries = 3;
    let stored = env.add_profile(p).await;

    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    env.settle().await;
    assert_eq!(env.pending().await, 1);

    // 配置在重试到期前被禁用
    postback_profile::Entity::update_many()
        .col_expr(postback_profile::Column::Enabled, Expr::value(false))
        .filter(postback_profile::Column::Id.eq(stored.id))
        .exec(env.context.storage.get_db())
        .await
        .unwrap();

    let later = Utc::now() + TimeDelta::hours(1);
    assert_eq!(env.run_retries(later).await, 0);
    assert_eq!(env.pending().await, 0);
    assert_eq!(env.deliveries().await.len(), 1);
}

#[tokio::test]
async fn test_render_failure_is_logged_without_retry() {
    let env = setup(vec![Reply::Status(200)]).await;
    env.add_profile(profile_at("broken", "not a url", 3)).await;

    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    env.settle().await;

    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DeliveryStatus::RenderError);
    assert!(rows[0].error.is_some());
    assert!(rows[0].response_code.is_none());
    assert!(rows[0].next_retry_at.is_none());
    assert!(env.transport.requests().is_empty());
    assert_eq!(env.pending().await, 0);
}

// =============================================================================
// Concurrency and isolation
// =============================================================================

#[tokio::test]
async fn test_concurrent_duplicate_events_deliver_once() {
    let env = setup(vec![Reply::Status(200)]).await;
    env.add_profile(profile("global", Scope::Global)).await;

    let tasks = (0..8).map(|_| {
        let service = env.context.event_service.clone();
        tokio::spawn(async move { service.record(deposit(Some(50.0))).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    env.settle().await;

    let created = results
        .iter()
        .filter(|r| r.status == EventStatus::Success)
        .count();
    assert_eq!(created, 1);
    assert_eq!(results.len() - created, 7);
    let event_id = &results[0].event.event_id;
    assert!(results.iter().all(|r| &r.event.event_id == event_id));

    let stored = event::Entity::find()
        .count(env.context.storage.get_db())
        .await
        .unwrap();
    assert_eq!(stored, 1);

    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attempt, 1);
    assert_eq!(env.transport.requests().len(), 1);
}

#[tokio::test]
async fn test_failing_profile_does_not_affect_others() {
    let transport = ScriptedTransport::routed(vec![
        Route {
            host: "down.example.com",
            delay: Duration::ZERO,
            reply: Reply::Fail,
        },
        Route {
            host: "up.example.com",
            delay: Duration::ZERO,
            reply: Reply::Status(200),
        },
    ]);
    let env = setup_with(transport, StaticConfig::default()).await;
    let down = env
        .add_profile(profile_at("down", "https://down.example.com/", 3))
        .await;
    let up = env
        .add_profile(profile_at("up", "https://up.example.com/", 3))
        .await;

    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    env.settle().await;

    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 2);
    let down_row = rows.iter().find(|r| r.profile_id == down.id).unwrap();
    let up_row = rows.iter().find(|r| r.profile_id == up.id).unwrap();
    assert_eq!(down_row.status, DeliveryStatus::TransportError);
    assert!(down_row.next_retry_at.is_some());
    assert_eq!(up_row.status, DeliveryStatus::Success);
    assert!(up_row.next_retry_at.is_none());

    assert_eq!(env.pending().await, 1);
    let jobs = env
        .context
        .storage
        .take_due(Utc::now() + TimeDelta::hours(1), 10)
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].profile_id, down.id);
    assert_eq!(jobs[0].attempt, 2);
    assert_eq!(jobs[0].chain_id, down_row.chain_id);
}

#[tokio::test]
async fn test_slow_endpoint_does_not_hold_up_scheduler() {
    let transport = ScriptedTransport::routed(vec![
        Route {
            host: "slow.example.com",
            delay: Duration::from_secs(3),
            reply: Reply::Status(200),
        },
        Route {
            host: "fast.example.com",
            delay: Duration::ZERO,
            reply: Reply::Status(200),
        },
    ]);
    let mut config = StaticConfig::default();
    config.postback.poll_interval_ms = 50;
    let env = setup_with(transport, config).await;

    // 无配置时写入事件，不触发投递
    let recorded = env
        .context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    let slow = env
        .add_profile(profile_at("slow", "https://slow.example.com/", 3))
        .await;
    let fast = env
        .add_profile(profile_at("fast", "https://fast.example.com/", 3))
        .await;

    let now = Utc::now();
    for (p, due_at) in [(&slow, now), (&fast, now + TimeDelta::milliseconds(300))] {
        env.context
            .storage
            .schedule(NewRetryJob {
                chain_id: format!("chain-{}", p.name),
                profile_id: p.id,
                event_id: recorded.event.event_id.clone(),
                attempt: 2,
                due_at,
            })
            .await
            .unwrap();
    }

    let scheduler = env.context.scheduler.clone();
    let runner = tokio::spawn(async move { scheduler.run().await });

    let fast_row = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(row) = env
                .deliveries()
                .await
                .into_iter()
                .find(|r| r.profile_id == fast.id)
            {
                return row;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("due retry waited behind a slow endpoint");

    assert_eq!(fast_row.status, DeliveryStatus::Success);
    assert_eq!(fast_row.attempt, 2);
    // 慢端点仍在途
    assert!(env.context.executor.in_flight_count() >= 1);
    assert!(
        !env.deliveries()
            .await
            .iter()
            .any(|r| r.profile_id == slow.id)
    );

    env.context.executor.shutdown_signal().trigger();
    runner.await.unwrap();
    env.settle().await;

    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.profile_id == slow.id));
}

// =============================================================================
// Dispatch failure
// =============================================================================

/// 首次 `list_matching` 失败的配置仓库
struct FlakyProfiles {
    inner: Arc<SeaOrmStorage>,
    fail_next: AtomicBool,
}

#[async_trait]
impl ProfileRepository for FlakyProfiles {
    async fn list_matching(&self, chain: &ScopeChain) -> Result<Vec<PostbackProfile>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ClickTrailError::database_operation("connection reset by peer"));
        }
        self.inner.list_matching(chain).await
    }

    async fn get_profile(&self, id: i64) -> Result<Option<PostbackProfile>> {
        self.inner.get_profile(id).await
    }
}

#[tokio::test]
async fn test_failed_dispatch_is_recovered_on_resubmit() {
    let env = setup(vec![Reply::Status(200)]).await;
    env.add_profile(profile("global", Scope::Global)).await;

    let storage = env.context.storage.clone();
    let profiles = Arc::new(FlakyProfiles {
        inner: storage.clone(),
        fail_next: AtomicBool::new(true),
    });
    let executor = DeliveryExecutor::new(
        profiles,
        storage.clone(),
        storage.clone(),
        env.transport.clone(),
        ExecutorSettings::from_config(&StaticConfig::default().postback),
        ShutdownSignal::new(),
    );
    let events = EventService::new(storage.clone(), Arc::new(executor.clone()));

    let err = events.record(deposit(Some(50.0))).await.unwrap_err();
    assert!(matches!(err, ClickTrailError::DatabaseOperation(_)));
    assert!(executor.wait_idle(Duration::from_secs(5)).await);
    assert!(env.deliveries().await.is_empty());

    // 事件已保存，重发时补发回传
    let again = events.record(deposit(Some(50.0))).await.unwrap();
    assert_eq!(again.status, EventStatus::Duplicate);
    assert!(executor.wait_idle(Duration::from_secs(5)).await);
    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_id, again.event.event_id);
    assert_eq!(rows[0].status, DeliveryStatus::Success);

    let third = events.record(deposit(Some(50.0))).await.unwrap();
    assert_eq!(third.status, EventStatus::Duplicate);
    assert!(executor.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(env.deliveries().await.len(), 1);
    assert_eq!(env.transport.requests().len(), 1);
}

// =============================================================================
// Shutdown drain
// =============================================================================

#[tokio::test]
async fn test_drain_timeout_requeues_in_flight_attempts() {
    let transport = ScriptedTransport::routed(vec![Route {
        host: "slow.example.com",
        delay: Duration::from_millis(800),
        reply: Reply::Fail,
    }]);
    let env = setup_with(transport, StaticConfig::default()).await;
    let p = env
        .add_profile(profile_at("slow", "https://slow.example.com/", 3))
        .await;

    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();

    let executor = &env.context.executor;
    executor.shutdown_signal().trigger();
    assert!(!executor.wait_idle(Duration::from_millis(100)).await);

    let chains = executor.abandon_in_flight().await;
    assert_eq!(chains.len(), 1);
    assert_eq!(env.pending().await, 1);
    assert!(executor.abandon_in_flight().await.is_empty());

    // 迟到的结果只写日志，不再追加重试
    env.settle().await;
    let rows = env.deliveries().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DeliveryStatus::TransportError);
    assert!(rows[0].next_retry_at.is_none());
    assert_eq!(env.pending().await, 1);

    let jobs = env
        .context
        .storage
        .take_due(Utc::now() + TimeDelta::hours(1), 10)
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].chain_id, chains[0]);
    assert_eq!(jobs[0].profile_id, p.id);
    assert_eq!(jobs[0].attempt, 1);
}

// =============================================================================
// Delivery log API
// =============================================================================

const TOKEN: &str = "test-admin-token";

macro_rules! admin_app {
    ($ctx:expr) => {{
        let api = ApiConfig {
            admin_token: TOKEN.to_string(),
            ..StaticConfig::default().api
        };
        test::init_service(
            App::new()
                .app_data(web::Data::new($ctx.storage.clone()))
                .app_data(web::Data::new($ctx.click_service.clone()))
                .app_data(web::Data::new($ctx.event_service.clone()))
                .app_data(web::Data::new($ctx.delivery_service.clone()))
                .configure(move |cfg| configure_routes(cfg, &api)),
        )
        .await
    }};
}

#[actix_rt::test]
async fn test_delivery_api_requires_token() {
    let env = setup(vec![]).await;
    let app = admin_app!(env.context);

    let req = TestRequest::get()
        .uri("/postback/deliveries")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = TestRequest::get()
        .uri("/postback/deliveries")
        .insert_header(("Authorization", "Bearer wrong"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_delivery_api_disabled_without_token() {
    let env = setup(vec![]).await;
    let api = StaticConfig::default().api;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(env.context.storage.clone()))
            .app_data(web::Data::new(env.context.delivery_service.clone()))
            .configure(move |cfg| configure_routes(cfg, &api)),
    )
    .await;

    let req = TestRequest::get()
        .uri("/postback/deliveries")
        .insert_header(("Authorization", "Bearer anything"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_delivery_api_list_get_and_retry() {
    let env = setup(vec![Reply::Status(500), Reply::Status(200)]).await;
    env.add_profile(profile("global", Scope::Global)).await;
    env.context
        .event_service
        .record(deposit(Some(50.0)))
        .await
        .unwrap();
    env.settle().await;

    let app = admin_app!(env.context);
    let auth = ("Authorization", format!("Bearer {}", TOKEN));

    let req = TestRequest::get()
        .uri("/postback/deliveries?status=http_error&click_id=CLK1")
        .insert_header(auth.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["count"], 1);
    let id = body["items"][0]["id"].as_i64().unwrap();
    assert_eq!(body["items"][0]["status"], "http_error");

    let req = TestRequest::get()
        .uri(&format!("/postback/deliveries/{}", id))
        .insert_header(auth.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["response_code"], 500);

    let req = TestRequest::post()
        .uri(&format!("/postback/deliveries/{}/retry", id))
        .insert_header(auth.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["delivery_id"], id);
    assert!(body["chain_id"].as_str().is_some());

    env.settle().await;
    assert_eq!(env.deliveries().await.len(), 2);

    let req = TestRequest::get()
        .uri("/postback/deliveries?status=exploded")
        .insert_header(auth.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = TestRequest::get()
        .uri("/postback/deliveries/424242")
        .insert_header(auth)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
