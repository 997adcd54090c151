//! Event ingestion service
//!
//! 校验事件、按幂等键写库，领取投递权后同步匹配配置并交给执行器异步投递。
//! 派发失败时归还投递权并返回错误，调用方重发同一事件会补发回传。

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::click_service::MAX_CLICK_ID_LEN;
use crate::errors::{ClickTrailError, Result};
use crate::postback::EventDispatcher;
use crate::storage::models::{Click, Event, EventType, InsertOutcome};
use crate::storage::repository::AttributionStore;

/// txid 最大长度
pub const MAX_TXID_LEN: usize = 128;

// ============ Request/Response DTOs ============

/// 入站事件（未校验）
#[derive(Debug, Clone, Default)]
pub struct EventRequest {
    pub clickid: String,
    pub event_type: String,
    pub revenue: Option<f64>,
    pub currency: Option<String>,
    pub txid: Option<String>,
    pub time_on_page_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct EventResult {
    pub status: EventStatus,
    pub event: Event,
}

/// 校验后的事件字段
#[derive(Debug, Clone, PartialEq)]
struct ValidatedEvent {
    click_id: String,
    event_type: EventType,
    revenue: Option<f64>,
    currency: Option<String>,
    txid: Option<String>,
    time_on_page_ms: Option<i64>,
}

fn validate(request: EventRequest) -> Result<ValidatedEvent> {
    let click_id = request.clickid.trim().to_string();
    if click_id.is_empty() {
        return Err(ClickTrailError::validation("clickid 不能为空"));
    }
    if click_id.chars().count() > MAX_CLICK_ID_LEN {
        return Err(ClickTrailError::validation(format!(
            "clickid 长度不能超过 {} 个字符",
            MAX_CLICK_ID_LEN
        )));
    }

    let raw_type = request.event_type.trim();
    let event_type = EventType::from_str(raw_type)
        .map_err(|_| ClickTrailError::validation(format!("未知的事件类型: '{}'", raw_type)))?;

    if let Some(revenue) = request.revenue
        && !revenue.is_finite()
    {
        return Err(ClickTrailError::validation("revenue 必须是有限数值"));
    }

    let currency = match request.currency.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(c) if c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()) => {
            Some(c.to_ascii_uppercase())
        }
        Some(c) => {
            return Err(ClickTrailError::validation(format!(
                "currency 必须是 3 位字母代码: '{}'",
                c
            )));
        }
    };

    let txid = request
        .txid
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if let Some(ref t) = txid
        && t.chars().count() > MAX_TXID_LEN
    {
        return Err(ClickTrailError::validation(format!(
            "txid 长度不能超过 {} 个字符",
            MAX_TXID_LEN
        )));
    }

    if let Some(ms) = request.time_on_page_ms
        && ms < 0
    {
        return Err(ClickTrailError::validation("time_on_page_ms 不能为负数"));
    }

    Ok(ValidatedEvent {
        click_id,
        event_type,
        revenue: request.revenue,
        currency,
        txid,
        time_on_page_ms: request.time_on_page_ms,
    })
}

pub struct EventService {
    store: Arc<dyn AttributionStore>,
    dispatcher: Arc<dyn EventDispatcher>,
}

impl EventService {
    pub fn new(store: Arc<dyn AttributionStore>, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// 记录事件
    ///
    /// - 校验失败 → Validation，不写库
    /// - clickid 不存在 → NotFound，不写库
    /// - (clickid, type, txid) 已存在 → Duplicate，返回已有事件；
    ///   此前派发失败的事件会在这里补发
    /// - 派发失败 → 返回错误，事件保留但投递权被归还
    #[instrument(skip(self, request), fields(clickid = %request.clickid, event_type = %request.event_type))]
    pub async fn record(&self, request: EventRequest) -> Result<EventResult> {
        let input = validate(request)?;

        let click = self
            .store
            .find_click(&input.click_id)
            .await?
            .ok_or_else(|| {
                ClickTrailError::not_found(format!("click '{}' 不存在", input.click_id))
            })?;

        let event = Event {
            event_id: Uuid::now_v7().to_string(),
            click_id: input.click_id,
            event_type: input.event_type,
            revenue: input.revenue,
            currency: input.currency,
            txid: input.txid,
            time_on_page_ms: input.time_on_page_ms,
            created_at: Utc::now(),
        };

        let (status, event) = match self.store.insert_event(event).await? {
            InsertOutcome::Created(event) => {
                info!(
                    "Event recorded: {} {} for click {}",
                    event.event_type, event.event_id, event.click_id
                );
                (EventStatus::Success, event)
            }
            InsertOutcome::Existing(event) => (EventStatus::Duplicate, event),
        };

        if self.store.claim_dispatch(&event.event_id).await? {
            self.dispatch(&event, &click).await?;
        } else {
            debug!("Event {} already dispatched", event.event_id);
        }

        Ok(EventResult { status, event })
    }

    async fn dispatch(&self, event: &Event, click: &Click) -> Result<()> {
        match self.dispatcher.dispatch(event, click).await {
            Ok(n) => {
                debug!("Dispatched {} postback chain(s) for {}", n, event.event_id);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to dispatch postbacks for event {}: {}",
                    event.event_id, e
                );
                if let Err(release_err) = self.store.release_dispatch(&event.event_id).await {
                    error!(
                        "Event {} stays marked as dispatched without postbacks: {}",
                        event.event_id, release_err
                    );
                }
                Err(e)
            }
        }
    }
}
