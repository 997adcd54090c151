//! Server mode
//!
//! 启动 HTTP 服务与重试调度器，并等待关闭信号。

use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::configure_routes;
use crate::api::middleware::RequestIdMiddleware;
use crate::runtime::lifetime;

/// Run the HTTP server
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server() -> Result<()> {
    let context = lifetime::startup::prepare_server_startup()
        .await
        .map_err(|e| {
            tracing::error!("Server startup failed: {}", e);
            e
        })?;

    let config = crate::config::get_config();
    let cpu_count = config.server.cpu_count.clamp(1, 32);
    warn!("Using {} CPU cores for the server", cpu_count);

    if config.api.admin_token.is_empty() {
        info!("Delivery log API is disabled (api.admin_token not set)");
    } else {
        info!(
            "Delivery log API available at: {}/deliveries",
            config.api.postback_prefix
        );
    }

    let scheduler = context.scheduler.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    let executor = context.executor.clone();
    let api_config = config.api.clone();
    let app_context = context.clone();

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    warn!("Starting server at http://{}", bind_address);

    let server = HttpServer::new(move || {
        let api_config = api_config.clone();
        App::new()
            .wrap(Compress::default())
            .wrap(RequestIdMiddleware)
            .wrap(DefaultHeaders::new().add(("Connection", "keep-alive")))
            .app_data(web::Data::new(app_context.storage.clone()))
            .app_data(web::Data::new(app_context.click_service.clone()))
            .app_data(web::Data::new(app_context.event_service.clone()))
            .app_data(web::Data::new(app_context.delivery_service.clone()))
            .app_data(web::PayloadConfig::new(64 * 1024))
            .configure(move |cfg| configure_routes(cfg, &api_config))
    })
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_millis(5000))
    .workers(cpu_count)
    .disable_signals()
    .bind(&bind_address)?
    .run();

    let drain_timeout = Duration::from_secs(config.postback.drain_timeout_secs);

    tokio::select! {
        res = server => {
            res?;
        }
        _ = lifetime::shutdown::listen_for_shutdown(&executor, drain_timeout) => {
            warn!("Graceful shutdown: postback drain completed");
        }
    }

    executor.shutdown_signal().trigger();
    if tokio::time::timeout(Duration::from_secs(5), scheduler_handle)
        .await
        .is_err()
    {
        warn!("Retry scheduler did not stop in time");
    }

    Ok(())
}
