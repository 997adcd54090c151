//! 点击与事件摄入接口

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::http::header::{LOCATION, REFERER, USER_AGENT};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::helpers::error_response;
use crate::config::get_config;
use crate::services::{ClickOutcome, ClickRequest, ClickService, EventRequest, EventService};
use crate::storage::models::{SUB_PARAM_COUNT, UtmParams};
use crate::utils::ip::extract_client_ip;

/// 事件请求体（POST JSON 或 GET 查询参数）
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EventPayload {
    #[serde(alias = "click_id")]
    pub clickid: String,
    #[serde(rename = "type", alias = "event_type")]
    pub event_type: String,
    pub revenue: Option<f64>,
    pub currency: Option<String>,
    pub txid: Option<String>,
    pub time_on_page_ms: Option<i64>,
}

impl From<EventPayload> for EventRequest {
    fn from(p: EventPayload) -> Self {
        EventRequest {
            clickid: p.clickid,
            event_type: p.event_type,
            revenue: p.revenue,
            currency: p.currency,
            txid: p.txid,
            time_on_page_ms: p.time_on_page_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct RecordedResponse<'a> {
    status: &'static str,
    clickid: &'a str,
}

#[derive(Debug, Serialize)]
struct EventResponse<'a> {
    status: crate::services::EventStatus,
    event_id: &'a str,
    clickid: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
}

fn header_str(req: &HttpRequest, name: actix_web::http::header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// 从查询参数组装点击请求
fn click_request_from_query(
    req: &HttpRequest,
    mut query: HashMap<String, String>,
    trusted_proxies: &[String],
) -> ClickRequest {
    let mut subs: [Option<String>; SUB_PARAM_COUNT] = Default::default();
    for (i, slot) in subs.iter_mut().enumerate() {
        *slot = query.remove(&format!("sub{}", i + 1));
    }

    ClickRequest {
        click_id: query.remove("clickid").or_else(|| query.remove("click_id")),
        campaign_id: query.remove("campaign_id"),
        offer_id: query.remove("offer_id"),
        flow_id: query.remove("flow_id"),
        source_id: query.remove("source_id"),
        subs,
        utm: UtmParams {
            source: query.remove("utm_source"),
            medium: query.remove("utm_medium"),
            campaign: query.remove("utm_campaign"),
            term: query.remove("utm_term"),
            content: query.remove("utm_content"),
        },
        referrer: header_str(req, REFERER),
        user_agent: header_str(req, USER_AGENT),
        ip: extract_client_ip(req, trusted_proxies),
    }
}

pub struct TrackingService;

impl TrackingService {
    /// GET /click
    pub async fn click(
        req: HttpRequest,
        query: web::Query<HashMap<String, String>>,
        service: web::Data<Arc<ClickService>>,
    ) -> impl Responder {
        let config = get_config();
        let request =
            click_request_from_query(&req, query.into_inner(), &config.tracking.trusted_proxies);

        match service.ingest(request).await {
            Ok(ClickOutcome::Redirect { click, location }) => {
                trace!("Redirecting click {} to {}", click.click_id, location);
                HttpResponse::build(StatusCode::FOUND)
                    .insert_header((LOCATION, location))
                    .insert_header(("Cache-Control", "no-store"))
                    .finish()
            }
            Ok(ClickOutcome::Recorded { click }) => HttpResponse::Ok().json(RecordedResponse {
                status: "recorded",
                clickid: &click.click_id,
            }),
            Err(e) => error_response(&e),
        }
    }

    /// POST /event
    pub async fn event_json(
        payload: web::Json<EventPayload>,
        service: web::Data<Arc<EventService>>,
    ) -> impl Responder {
        Self::record_event(payload.into_inner(), &service).await
    }

    /// GET /event
    pub async fn event_query(
        payload: web::Query<EventPayload>,
        service: web::Data<Arc<EventService>>,
    ) -> impl Responder {
        Self::record_event(payload.into_inner(), &service).await
    }

    async fn record_event(payload: EventPayload, service: &EventService) -> HttpResponse {
        match service.record(payload.into()).await {
            Ok(result) => HttpResponse::Ok().json(EventResponse {
                status: result.status,
                event_id: &result.event.event_id,
                clickid: &result.event.click_id,
                event_type: result.event.event_type.as_ref(),
            }),
            Err(e) => error_response(&e),
        }
    }
}

/// 摄入路由
pub fn tracking_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/click", web::get().to(TrackingService::click))
        .route("/event", web::post().to(TrackingService::event_json))
        .route("/event", web::get().to(TrackingService::event_query));
}
