//! 服务启动：创建存储并装配服务

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::StaticConfig;
use crate::postback::{
    DeliveryExecutor, EventDispatcher, ExecutorSettings, PostbackTransport, RetryScheduler,
    ShutdownSignal, UreqTransport,
};
use crate::services::{
    ClickService, ClickSettings, DeliveryService, EventService, GeoIpProvider, GeoResolver,
    UserAgentParser, WootheeParser,
};
use crate::storage::{SeaOrmStorage, StorageFactory};

/// 可替换的外部依赖
pub struct Collaborators {
    pub transport: Arc<dyn PostbackTransport>,
    pub geo: Arc<dyn GeoResolver>,
    pub user_agents: Arc<dyn UserAgentParser>,
}

impl Collaborators {
    pub fn from_config(config: &StaticConfig) -> Self {
        Self {
            transport: Arc::new(UreqTransport::new()),
            geo: Arc::new(GeoIpProvider::new(&config.tracking)),
            user_agents: Arc::new(WootheeParser::default()),
        }
    }
}

/// 装配完成的服务
#[derive(Clone)]
pub struct AppContext {
    pub storage: Arc<SeaOrmStorage>,
    pub click_service: Arc<ClickService>,
    pub event_service: Arc<EventService>,
    pub delivery_service: Arc<DeliveryService>,
    pub executor: DeliveryExecutor,
    pub scheduler: Arc<RetryScheduler>,
}

impl AppContext {
    pub fn build(
        storage: Arc<SeaOrmStorage>,
        collaborators: Collaborators,
        config: &StaticConfig,
    ) -> Self {
        let shutdown = ShutdownSignal::new();
        let executor = DeliveryExecutor::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            collaborators.transport,
            ExecutorSettings::from_config(&config.postback),
            shutdown,
        );

        let click_service = Arc::new(ClickService::new(
            storage.clone(),
            storage.clone(),
            collaborators.geo,
            collaborators.user_agents,
            ClickSettings::from_config(&config.tracking),
        ));

        let dispatcher: Arc<dyn EventDispatcher> = Arc::new(executor.clone());
        let event_service = Arc::new(EventService::new(storage.clone(), dispatcher));

        let delivery_service = Arc::new(DeliveryService::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            storage.clone(),
            Some(executor.clone()),
        ));

        let scheduler = Arc::new(RetryScheduler::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            executor.clone(),
            &config.postback,
        ));

        Self {
            storage,
            click_service,
            event_service,
            delivery_service,
            executor,
            scheduler,
        }
    }
}

/// 准备服务器启动的上下文
pub async fn prepare_server_startup() -> Result<AppContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let config = crate::config::get_config();

    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    let context = AppContext::build(storage, Collaborators::from_config(&config), &config);

    info!(
        "Pre-startup processing completed in {:?}",
        start_time.elapsed()
    );
    Ok(context)
}
