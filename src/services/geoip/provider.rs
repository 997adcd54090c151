//! GeoIP Provider 抽象层
//!
//! 根据配置自动选择实现：
//! 1. maxminddb_path 已配置且文件可读 → MaxMindProvider
//! 2. 否则 → ExternalApiProvider

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::external_api::ExternalApiProvider;
use super::maxmind::MaxMindProvider;
use crate::config::TrackingConfig;
use crate::storage::models::GeoInfo;
use crate::utils::ip::is_private_or_local;

/// 点击富化使用的地理位置解析接口
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// 查询 IP 地址的地理位置，失败时返回 None
    async fn lookup(&self, ip: &str) -> Option<GeoInfo>;

    /// provider 名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 统一 GeoIP Provider
#[derive(Clone)]
pub struct GeoIpProvider {
    inner: Arc<dyn GeoResolver>,
    enabled: bool,
}

impl GeoIpProvider {
    pub fn new(config: &TrackingConfig) -> Self {
        let inner: Arc<dyn GeoResolver> = match config.maxminddb_path.as_deref() {
            Some(path) if !path.is_empty() => match MaxMindProvider::new(path) {
                Ok(provider) => {
                    info!("GeoIP: Using MaxMind database at {}", path);
                    Arc::new(provider)
                }
                Err(e) => {
                    warn!(
                        "GeoIP: Failed to load MaxMind database at {}: {}, falling back to external API",
                        path, e
                    );
                    Arc::new(ExternalApiProvider::new(&config.geoip_api_url))
                }
            },
            _ => {
                debug!("GeoIP: No MaxMind database configured, using external API");
                Arc::new(ExternalApiProvider::new(&config.geoip_api_url))
            }
        };

        if config.enable_geo_lookup {
            info!("GeoIP: Initialized with {} provider", inner.name());
        } else {
            info!("GeoIP: lookup disabled");
        }

        Self {
            inner,
            enabled: config.enable_geo_lookup,
        }
    }
}

#[async_trait]
impl GeoResolver for GeoIpProvider {
    /// 私有地址和回环地址不查询
    async fn lookup(&self, ip: &str) -> Option<GeoInfo> {
        if !self.enabled {
            return None;
        }
        let addr: IpAddr = ip.parse().ok()?;
        if is_private_or_local(&addr) {
            return None;
        }
        self.inner.lookup(ip).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
