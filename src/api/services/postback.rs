//! 投递日志接口（需 Bearer token）

use std::str::FromStr;
use std::sync::Arc;

use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::helpers::error_response;
use crate::api::middleware::AdminAuth;
use crate::errors::{ClickTrailError, Result};
use crate::services::DeliveryService;
use crate::storage::models::{DeliveryFilter, DeliveryStatus, PostbackDelivery};

/// 查询参数，时间为 RFC3339
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeliveryQuery {
    pub profile_id: Option<i64>,
    pub status: Option<String>,
    pub event_id: Option<String>,
    pub click_id: Option<String>,
    pub chain_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn parse_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(Some(
            DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc),
        )),
        None => Ok(None),
    }
}

impl DeliveryQuery {
    pub fn into_filter(self) -> Result<DeliveryFilter> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(DeliveryStatus::from_str(s).map_err(|_| {
                ClickTrailError::validation(format!(
                    "未知的投递状态: '{}' (success, http_error, transport_error, render_error)",
                    s
                ))
            })?),
            None => None,
        };

        Ok(DeliveryFilter {
            profile_id: self.profile_id,
            status,
            from: parse_time(self.from.as_deref())?,
            to: parse_time(self.to.as_deref())?,
            event_id: self.event_id,
            click_id: self.click_id,
            chain_id: self.chain_id,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Serialize)]
struct DeliveryListResponse {
    count: usize,
    items: Vec<PostbackDelivery>,
}

#[derive(Debug, Serialize)]
struct RetryResponse {
    delivery_id: i64,
    chain_id: String,
}

pub struct DeliveryLogService;

impl DeliveryLogService {
    /// GET {prefix}/deliveries
    pub async fn list(
        query: web::Query<DeliveryQuery>,
        service: web::Data<Arc<DeliveryService>>,
    ) -> impl Responder {
        let filter = match query.into_inner().into_filter() {
            Ok(f) => f,
            Err(e) => return error_response(&e),
        };

        match service.list(&filter).await {
            Ok(items) => HttpResponse::Ok().json(DeliveryListResponse {
                count: items.len(),
                items,
            }),
            Err(e) => error_response(&e),
        }
    }

    /// GET {prefix}/deliveries/{id}
    pub async fn get(
        path: web::Path<i64>,
        service: web::Data<Arc<DeliveryService>>,
    ) -> impl Responder {
        match service.get(path.into_inner()).await {
            Ok(item) => HttpResponse::Ok().json(item),
            Err(e) => error_response(&e),
        }
    }

    /// POST {prefix}/deliveries/{id}/retry
    pub async fn retry(
        path: web::Path<i64>,
        service: web::Data<Arc<DeliveryService>>,
    ) -> impl Responder {
        match service.retry(path.into_inner()).await {
            Ok(triggered) => HttpResponse::Accepted().json(RetryResponse {
                delivery_id: triggered.delivery_id,
                chain_id: triggered.chain_id,
            }),
            Err(e) => error_response(&e),
        }
    }
}

/// 投递日志路由
pub fn postback_routes(cfg: &mut web::ServiceConfig, prefix: &str, admin_token: &str) {
    cfg.service(
        web::scope(prefix)
            .wrap(AdminAuth::new(admin_token))
            .route("/deliveries", web::get().to(DeliveryLogService::list))
            .route("/deliveries/{id}", web::get().to(DeliveryLogService::get))
            .route(
                "/deliveries/{id}/retry",
                web::post().to(DeliveryLogService::retry),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_into_filter() {
        let query = DeliveryQuery {
            status: Some("transport_error".to_string()),
            from: Some("2025-01-01T00:00:00Z".to_string()),
            limit: Some(10),
            ..Default::default()
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.status, Some(DeliveryStatus::TransportError));
        assert_eq!(filter.from.unwrap().to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert!(filter.to.is_none());
        assert_eq!(filter.limit, Some(10));
    }

    #[test]
    fn test_query_rejects_bad_values() {
        let bad_status = DeliveryQuery {
            status: Some("pending".to_string()),
            ..Default::default()
        };
        assert!(bad_status.into_filter().is_err());

        let bad_time = DeliveryQuery {
            from: Some("yesterday".to_string()),
            ..Default::default()
        };
        let err = bad_time.into_filter().unwrap_err();
        assert_eq!(err.http_status(), actix_web::http::StatusCode::BAD_REQUEST);
    }
}
