pub mod health;
pub mod helpers;
pub mod postback;
pub mod tracking;

use actix_web::web;

pub use health::{HealthService, health_routes};
pub use helpers::error_response;
pub use postback::{DeliveryLogService, postback_routes};
pub use tracking::{TrackingService, tracking_routes};

use crate::config::ApiConfig;

/// 注册全部路由
///
/// 调用方负责注入 `Arc<ClickService>`、`Arc<EventService>`、
/// `Arc<DeliveryService>` 与 `Arc<SeaOrmStorage>`。
pub fn configure_routes(cfg: &mut web::ServiceConfig, api: &ApiConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(helpers::json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(helpers::query_error_handler))
        .service(health_routes());
    postback_routes(cfg, &api.postback_prefix, &api.admin_token);
    tracking_routes(cfg);
}
