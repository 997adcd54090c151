//! Click ingestion service
//!
//! 规范化入站点击，富化地理与设备信息，生成或复用 clickid，
//! 持久化后返回跳转目标。

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::geoip::GeoResolver;
use super::sub_params::{Sub2AllowList, parse_sub2};
use super::user_agent::UserAgentParser;
use crate::config::TrackingConfig;
use crate::errors::{ClickTrailError, Result};
use crate::storage::models::{Click, InsertOutcome, SUB_PARAM_COUNT, UtmParams};
use crate::storage::repository::{AttributionStore, LandingResolver};
use crate::utils::generate_click_id;

/// 外部传入 clickid 的最大长度
pub const MAX_CLICK_ID_LEN: usize = 64;
/// 单个参数值的最大长度，超出部分截断
const MAX_PARAM_LEN: usize = 512;

// ============ Request/Response DTOs ============

/// 入站点击
#[derive(Debug, Clone, Default)]
pub struct ClickRequest {
    pub click_id: Option<String>,
    pub campaign_id: Option<String>,
    pub offer_id: Option<String>,
    pub flow_id: Option<String>,
    pub source_id: Option<String>,
    pub subs: [Option<String>; SUB_PARAM_COUNT],
    pub utm: UtmParams,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// 点击处理结果
#[derive(Debug, Clone)]
pub enum ClickOutcome {
    /// 302 跳转到落地页
    Redirect { click: Click, location: String },
    /// 已记录但没有可跳转的落地页
    Recorded { click: Click },
}

impl ClickOutcome {
    pub fn click(&self) -> &Click {
        match self {
            ClickOutcome::Redirect { click, .. } | ClickOutcome::Recorded { click } => click,
        }
    }
}

/// 点击摄入配置
#[derive(Debug, Clone)]
pub struct ClickSettings {
    pub default_landing_url: Option<String>,
    pub click_id_length: usize,
    pub sub2_allow_list: Sub2AllowList,
}

impl ClickSettings {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            default_landing_url: config
                .default_landing_url
                .clone()
                .filter(|u| !u.trim().is_empty()),
            click_id_length: config.click_id_length,
            sub2_allow_list: Sub2AllowList::new(&config.sub2_allowed_keys),
        }
    }
}

/// 去掉首尾空白，空字符串视为未传，过长截断
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| crate::utils::truncate_chars(&v, MAX_PARAM_LEN))
}

/// 外部 clickid 只允许字母、数字、`-`、`_`
pub fn validate_click_id(click_id: &str) -> Result<()> {
    if click_id.is_empty() {
        return Err(ClickTrailError::validation("clickid 不能为空"));
    }
    if click_id.chars().count() > MAX_CLICK_ID_LEN {
        return Err(ClickTrailError::validation(format!(
            "clickid 长度不能超过 {} 个字符",
            MAX_CLICK_ID_LEN
        )));
    }
    if !click_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ClickTrailError::validation("clickid 包含非法字符"));
    }
    Ok(())
}

/// 在落地页 URL 上附加 clickid 与非空的 sub 参数
///
/// 落地页已有的同名参数会被替换。
pub fn build_redirect_url(landing: &str, click: &Click) -> Option<String> {
    let mut url = Url::parse(landing).ok()?;

    let mut extra: Vec<(String, String)> = vec![("clickid".to_string(), click.click_id.clone())];
    for (i, sub) in click.subs.iter().enumerate() {
        if let Some(value) = sub {
            extra.push((format!("sub{}", i + 1), value.clone()));
        }
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !extra.iter().any(|(name, _)| name == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(kept.iter());
        pairs.extend_pairs(extra.iter());
    }

    Some(url.to_string())
}

pub struct ClickService {
    store: Arc<dyn AttributionStore>,
    landing: Arc<dyn LandingResolver>,
    geo: Arc<dyn GeoResolver>,
    user_agents: Arc<dyn UserAgentParser>,
    settings: ClickSettings,
}

impl ClickService {
    pub fn new(
        store: Arc<dyn AttributionStore>,
        landing: Arc<dyn LandingResolver>,
        geo: Arc<dyn GeoResolver>,
        user_agents: Arc<dyn UserAgentParser>,
        settings: ClickSettings,
    ) -> Self {
        Self {
            store,
            landing,
            geo,
            user_agents,
            settings,
        }
    }

    /// 处理一次点击
    ///
    /// - 没有 campaign/offer/flow 且没有默认落地页 → Validation，不写库
    /// - 显式 clickid 已存在 → 复用已有点击
    /// - 有引用但解析不到落地页 → 仍然写库，返回 Recorded
    #[instrument(skip(self, request), fields(offer_id = ?request.offer_id))]
    pub async fn ingest(&self, request: ClickRequest) -> Result<ClickOutcome> {
        let mut click = self.normalize(request);

        if !click.has_reference() && self.settings.default_landing_url.is_none() {
            return Err(ClickTrailError::validation(
                "缺少 campaign_id / offer_id / flow_id，且未配置默认落地页",
            ));
        }

        let explicit_id = !click.click_id.is_empty();
        if explicit_id {
            validate_click_id(&click.click_id)?;
            if let Some(existing) = self.store.find_click(&click.click_id).await? {
                debug!("Reusing existing click {}", existing.click_id);
                return Ok(self.outcome_for(existing));
            }
        } else {
            click.click_id = generate_click_id(self.settings.click_id_length);
        }

        click.landing_url = self.resolve_landing(&click).await?;
        self.enrich(&mut click).await;

        let stored = match self.store.insert_click(click).await? {
            InsertOutcome::Created(click) => {
                info!(
                    "Click recorded: {} (offer={:?}, campaign={:?}, flow={:?})",
                    click.click_id, click.offer_id, click.campaign_id, click.flow_id
                );
                click
            }
            InsertOutcome::Existing(click) => {
                debug!("Concurrent insert for click {}, reusing", click.click_id);
                click
            }
        };

        Ok(self.outcome_for(stored))
    }

    fn normalize(&self, request: ClickRequest) -> Click {
        let subs = request.subs.map(clean);
        let sub2_params = subs[1]
            .as_deref()
            .map(|raw| parse_sub2(raw, &self.settings.sub2_allow_list))
            .unwrap_or_default();

        Click {
            click_id: clean(request.click_id).unwrap_or_default(),
            campaign_id: clean(request.campaign_id),
            offer_id: clean(request.offer_id),
            flow_id: clean(request.flow_id),
            source_id: clean(request.source_id),
            subs,
            sub2_params,
            utm: UtmParams {
                source: clean(request.utm.source),
                medium: clean(request.utm.medium),
                campaign: clean(request.utm.campaign),
                term: clean(request.utm.term),
                content: clean(request.utm.content),
            },
            referrer: clean(request.referrer),
            user_agent: clean(request.user_agent),
            landing_url: None,
            ip: clean(request.ip),
            geo: Default::default(),
            device: Default::default(),
            created_at: Utc::now(),
        }
    }

    /// offer 落地页优先，其次默认落地页
    async fn resolve_landing(&self, click: &Click) -> Result<Option<String>> {
        if let Some(ref offer_id) = click.offer_id
            && let Some(landing) = self.landing.offer_landing(offer_id).await?
        {
            return Ok(Some(landing));
        }
        Ok(self.settings.default_landing_url.clone())
    }

    async fn enrich(&self, click: &mut Click) {
        if let Some(ref ip) = click.ip
            && let Some(geo) = self.geo.lookup(ip).await
        {
            click.geo = geo;
        }
        if let Some(ref ua) = click.user_agent {
            click.device = self.user_agents.parse(ua);
        }
    }

    fn outcome_for(&self, click: Click) -> ClickOutcome {
        let location = click
            .landing_url
            .as_deref()
            .and_then(|landing| {
                let url = build_redirect_url(landing, &click);
                if url.is_none() {
                    warn!(
                        "Landing URL for click {} is not a valid URL: {}",
                        click.click_id, landing
                    );
                }
                url
            });

        match location {
            Some(location) => ClickOutcome::Redirect { click, location },
            None => ClickOutcome::Recorded { click },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_with_subs() -> Click {
        let mut click = Click {
            click_id: "AbC123".to_string(),
            ..Default::default()
        };
        click.subs[0] = Some("aff7".to_string());
        click.subs[2] = Some("x y".to_string());
        click
    }

    #[test]
    fn test_build_redirect_url_appends_params() {
        let url = build_redirect_url("https://lp.example.com/offer?lang=en", &click_with_subs())
            .unwrap();
        assert_eq!(
            url,
            "https://lp.example.com/offer?lang=en&clickid=AbC123&sub1=aff7&sub3=x+y"
        );
    }

    #[test]
    fn test_build_redirect_url_replaces_existing_clickid() {
        let url =
            build_redirect_url("https://lp.example.com/?clickid=old", &click_with_subs()).unwrap();
        assert!(!url.contains("old"));
        assert!(url.contains("clickid=AbC123"));
    }

    #[test]
    fn test_build_redirect_url_invalid_landing() {
        assert!(build_redirect_url("not a url", &click_with_subs()).is_none());
    }

    #[test]
    fn test_validate_click_id() {
        assert!(validate_click_id("abc-123_XYZ").is_ok());
        assert!(validate_click_id("").is_err());
        assert!(validate_click_id("has space").is_err());
        assert!(validate_click_id(&"a".repeat(65)).is_err());
    }
}
