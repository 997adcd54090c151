//! 外部 GeoIP API 实现（如 ip-api.com）
//!
//! 内置 moka 缓存，同一 IP 的并发查询只发一次 HTTP 请求

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{trace, warn};
use ureq::Agent;

use super::provider::GeoResolver;
use crate::storage::models::GeoInfo;

/// GeoIP 缓存 TTL（15 分钟）
const GEOIP_CACHE_TTL_SECS: u64 = 15 * 60;
const GEOIP_CACHE_MAX_CAPACITY: u64 = 10_000;
/// 点击请求同步等待富化，超时需要短
const HTTP_TIMEOUT_SECS: u64 = 2;

static HTTP_AGENT: OnceLock<Agent> = OnceLock::new();

fn get_agent() -> &'static Agent {
    HTTP_AGENT.get_or_init(|| {
        Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(HTTP_TIMEOUT_SECS)))
            .build()
            .into()
    })
}

/// 解析 API 响应
///
/// 兼容 ip-api.com（countryCode / regionName / isp / proxy）
/// 以及其他 API 的常见字段名。
pub(super) fn parse_api_response(json: &serde_json::Value) -> Option<GeoInfo> {
    if json["status"].as_str() == Some("fail") {
        return None;
    }

    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| json[*k].as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let geo = GeoInfo {
        country_iso: text(&["countryCode", "country_code", "country"]),
        region: text(&["regionName", "region"]),
        city: text(&["city"]),
        isp: text(&["isp", "org"]),
        is_proxy: json["proxy"].as_bool(),
    };

    if geo == GeoInfo::default() {
        None
    } else {
        Some(geo)
    }
}

pub struct ExternalApiProvider {
    api_url_template: String,
    /// IP → GeoInfo 缓存（None 作为负缓存）
    cache: Cache<String, Option<GeoInfo>>,
}

impl ExternalApiProvider {
    /// `api_url_template` 使用 `{ip}` 作为占位符
    pub fn new(api_url_template: &str) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(GEOIP_CACHE_TTL_SECS))
            .max_capacity(GEOIP_CACHE_MAX_CAPACITY)
            .build();

        Self {
            api_url_template: api_url_template.to_string(),
            cache,
        }
    }

    fn fetch_from_api_sync(url: String) -> Option<GeoInfo> {
        let resp = match get_agent().get(&url).call() {
            Ok(r) => r,
            Err(e) => {
                warn!("GeoIP API request to \"{}\" failed: {}", url, e);
                return None;
            }
        };

        let json: serde_json::Value = match resp.into_body().read_json() {
            Ok(j) => j,
            Err(e) => {
                warn!("GeoIP API response from \"{}\" parse failed: {}", url, e);
                return None;
            }
        };

        let geo = parse_api_response(&json);
        trace!("External API lookup: {:?}", geo);
        geo
    }

    async fn fetch_from_api(&self, ip: &str) -> Option<GeoInfo> {
        let url = self.api_url_template.replace("{ip}", ip);

        tokio::task::spawn_blocking(move || Self::fetch_from_api_sync(url))
            .await
            .unwrap_or_else(|e| {
                warn!("GeoIP spawn_blocking failed: {}", e);
                None
            })
    }
}

#[async_trait]
impl GeoResolver for ExternalApiProvider {
    async fn lookup(&self, ip: &str) -> Option<GeoInfo> {
        self.cache
            .get_with(ip.to_string(), async {
                trace!("GeoIP cache miss for {}, fetching from API", ip);
                self.fetch_from_api(ip).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ExternalAPI"
    }
}
