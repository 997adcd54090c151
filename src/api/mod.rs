//! HTTP 接口：点击/事件摄入、投递日志与健康检查

pub mod middleware;
pub mod services;

pub use services::configure_routes;
