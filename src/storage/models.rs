//! 归因与回传的领域模型

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// sub 参数个数（sub1..sub10）
pub const SUB_PARAM_COUNT: usize = 10;

/// 事件类型（封闭集合）
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    AsRefStr,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Open,
    LpClick,
    Reg,
    Deposit,
    Sale,
    Lead,
    LpLeave,
}

/// UTM 参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub term: Option<String>,
    pub content: Option<String>,
}

/// 地理位置信息（点击写入时一次性富化）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country_iso: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub is_proxy: Option<bool>,
}

/// 从 User-Agent 解析出的设备信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub browser_name: Option<String>,
    pub browser_version: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,
}

/// 一次入站点击
///
/// `click_id` 唯一且不可变，点击写入后不再更新。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Click {
    pub click_id: String,
    pub campaign_id: Option<String>,
    pub offer_id: Option<String>,
    pub flow_id: Option<String>,
    pub source_id: Option<String>,
    pub subs: [Option<String>; SUB_PARAM_COUNT],
    /// sub2 结构化解析结果（仅允许列表中的 key）
    pub sub2_params: BTreeMap<String, String>,
    pub utm: UtmParams,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub landing_url: Option<String>,
    pub ip: Option<String>,
    pub geo: GeoInfo,
    pub device: DeviceInfo,
    pub created_at: DateTime<Utc>,
}

impl Click {
    /// 获取 subN（1 起始）
    pub fn sub(&self, n: usize) -> Option<&str> {
        if n == 0 {
            return None;
        }
        self.subs.get(n - 1).and_then(|s| s.as_deref())
    }

    /// 该点击的归因链
    pub fn scope_chain(&self) -> ScopeChain {
        ScopeChain {
            flow_id: self.flow_id.clone(),
            offer_id: self.offer_id.clone(),
            campaign_id: self.campaign_id.clone(),
        }
    }

    pub fn has_reference(&self) -> bool {
        self.campaign_id.is_some() || self.offer_id.is_some() || self.flow_id.is_some()
    }
}

/// 与点击绑定的转化/生命周期事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// UUID v7，按时间排序
    pub event_id: String,
    pub click_id: String,
    pub event_type: EventType,
    pub revenue: Option<f64>,
    pub currency: Option<String>,
    pub txid: Option<String>,
    pub time_on_page_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// 幂等插入的结果
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Created(T),
    Existing(T),
}

impl<T> InsertOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            InsertOutcome::Created(v) | InsertOutcome::Existing(v) => v,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, InsertOutcome::Created(_))
    }
}

/// 只读 offer（由管理端维护）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub name: String,
    pub landing_url: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// 回传配置的作用域
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope_type", content = "scope_id", rename_all = "snake_case")]
pub enum Scope {
    Global,
    Campaign(String),
    Offer(String),
    Flow(String),
}

impl Scope {
    /// 越小越具体：flow > offer > campaign > global
    pub fn specificity(&self) -> u8 {
        match self {
            Scope::Flow(_) => 0,
            Scope::Offer(_) => 1,
            Scope::Campaign(_) => 2,
            Scope::Global => 3,
        }
    }

    pub fn scope_type(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Campaign(_) => "campaign",
            Scope::Offer(_) => "offer",
            Scope::Flow(_) => "flow",
        }
    }

    pub fn scope_id(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Campaign(id) | Scope::Offer(id) | Scope::Flow(id) => Some(id),
        }
    }

    /// 由数据库中的 (scope_type, scope_id) 还原
    ///
    /// global 必须没有 scope_id，其他类型必须有非空 scope_id。
    pub fn from_parts(scope_type: &str, scope_id: Option<&str>) -> Option<Self> {
        let scope_id = scope_id.filter(|s| !s.is_empty());
        match (scope_type, scope_id) {
            ("global", None) => Some(Scope::Global),
            ("campaign", Some(id)) => Some(Scope::Campaign(id.to_string())),
            ("offer", Some(id)) => Some(Scope::Offer(id.to_string())),
            ("flow", Some(id)) => Some(Scope::Flow(id.to_string())),
            _ => None,
        }
    }

    /// 是否匹配给定的归因链
    pub fn matches(&self, chain: &ScopeChain) -> bool {
        match self {
            Scope::Global => true,
            Scope::Flow(id) => chain.flow_id.as_deref() == Some(id.as_str()),
            Scope::Offer(id) => chain.offer_id.as_deref() == Some(id.as_str()),
            Scope::Campaign(id) => chain.campaign_id.as_deref() == Some(id.as_str()),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scope_id() {
            Some(id) => write!(f, "{}:{}", self.scope_type(), id),
            None => write!(f, "{}", self.scope_type()),
        }
    }
}

/// 点击的归因链
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeChain {
    pub flow_id: Option<String>,
    pub offer_id: Option<String>,
    pub campaign_id: Option<String>,
}

/// 回传 HTTP 方法
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// 回传认证配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostbackAuth {
    pub query_key: Option<String>,
    pub query_val: Option<String>,
    pub header_name: Option<String>,
    pub header_val: Option<String>,
}

/// HMAC 签名配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmacSettings {
    pub enabled: bool,
    pub secret: Option<String>,
    pub payload_template: Option<String>,
    pub param_name: Option<String>,
}

/// 默认签名参数名
pub const DEFAULT_HMAC_PARAM: &str = "signature";

impl HmacSettings {
    pub fn param_name(&self) -> &str {
        self.param_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_HMAC_PARAM)
    }
}

/// 回传配置（投递目标）
///
/// 对引擎只读，由管理端或 `profiles import` 写入。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostbackProfile {
    pub id: i64,
    pub name: String,
    pub owner_id: Option<String>,
    pub scope: Scope,
    pub priority: i32,
    pub enabled: bool,
    pub method: HttpMethod,
    pub endpoint_url_template: String,
    /// 参数名 → 模板，保持插入顺序
    pub params_template: Vec<(String, String)>,
    pub body_template: Option<String>,
    pub status_map: BTreeMap<String, String>,
    pub filter_revenue_gt0: bool,
    pub auth: PostbackAuth,
    pub hmac: HmacSettings,
    /// 最大尝试次数
    pub retries: u32,
    pub backoff_base_sec: u32,
    pub timeout_ms: u64,
    pub url_encode: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 单次投递结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    HttpError,
    TransportError,
    /// 请求无法渲染（模板产出非法 URL 等），不发送、不重试
    RenderError,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// 待写入的投递日志
#[derive(Debug, Clone, PartialEq)]
pub struct NewDelivery {
    pub chain_id: String,
    pub profile_id: i64,
    pub event_id: String,
    pub click_id: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: DeliveryStatus,
    pub request_method: HttpMethod,
    pub request_url: String,
    pub request_body: Option<String>,
    pub request_headers: Vec<(String, String)>,
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 投递日志行（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostbackDelivery {
    pub id: i64,
    pub chain_id: String,
    pub profile_id: i64,
    pub event_id: String,
    pub click_id: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: DeliveryStatus,
    pub request_method: String,
    pub request_url: String,
    pub request_body: Option<String>,
    pub request_headers: Option<String>,
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 投递日志查询条件
#[derive(Debug, Clone, Default)]
pub struct DeliveryFilter {
    pub profile_id: Option<i64>,
    pub status: Option<DeliveryStatus>,
    pub event_id: Option<String>,
    pub click_id: Option<String>,
    pub chain_id: Option<String>,
    /// created_at >= from
    pub from: Option<DateTime<Utc>>,
    /// created_at <= to
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// 持久化的重试任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryJob {
    pub id: i64,
    pub chain_id: String,
    pub profile_id: i64,
    pub event_id: String,
    /// 本次要执行的尝试序号
    pub attempt: u32,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// 新建重试任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRetryJob {
    pub chain_id: String,
    pub profile_id: i64,
    pub event_id: String,
    pub attempt: u32,
    pub due_at: DateTime<Utc>,
}
