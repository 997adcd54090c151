use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, trace};

use crate::storage::SeaOrmStorage;
use crate::storage::repository::RetryQueue;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct HealthStorageCheck {
    pub status: &'static str,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthRetryQueueCheck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub storage: HealthStorageCheck,
    pub retry_queue: HealthRetryQueueCheck,
    pub response_time_ms: u32,
}

/// Health Service
///
/// 直接访问存储：探活 + 重试队列深度。
pub struct HealthService;

impl HealthService {
    pub async fn health_check(storage: web::Data<Arc<SeaOrmStorage>>) -> impl Responder {
        let start_time = Instant::now();
        trace!("Received health check request");

        let backend = storage.backend_name().to_string();
        let storage_check = match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, storage.ping()).await
        {
            Ok(Ok(())) => HealthStorageCheck {
                status: "healthy",
                backend,
                error: None,
            },
            Ok(Err(e)) => {
                error!("Storage health check failed: {}", e);
                HealthStorageCheck {
                    status: "unhealthy",
                    backend,
                    error: Some(format!("database error: {}", e)),
                }
            }
            Err(_) => {
                error!("Storage health check timeout");
                HealthStorageCheck {
                    status: "unhealthy",
                    backend,
                    error: Some("timeout".to_string()),
                }
            }
        };

        let pending = match storage.pending_count().await {
            Ok(n) => Some(n),
            Err(e) => {
                error!("Retry queue depth unavailable: {}", e);
                None
            }
        };

        let is_healthy = storage_check.status == "healthy";
        let body = HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" },
            timestamp: chrono::Utc::now().to_rfc3339(),
            storage: storage_check,
            retry_queue: HealthRetryQueueCheck { pending },
            response_time_ms: start_time.elapsed().as_millis() as u32,
        };

        let status = if is_healthy {
            actix_web::http::StatusCode::OK
        } else {
            actix_web::http::StatusCode::SERVICE_UNAVAILABLE
        };
        HttpResponse::build(status).json(body)
    }

    // 存活检查
    pub async fn liveness_check() -> impl Responder {
        HttpResponse::NoContent().finish()
    }
}

/// Health 路由配置
pub fn health_routes() -> actix_web::Scope {
    web::scope("/health")
        .route("", web::get().to(HealthService::health_check))
        .route("", web::head().to(HealthService::health_check))
        .route("/live", web::get().to(HealthService::liveness_check))
}
