//! 出站请求构造
//!
//! 一个配置 + 渲染上下文 → 一个完全确定的 HTTP 请求。

use std::time::Duration;

use tracing::warn;
use url::Url;

use super::signing::hmac_sha256_hex;
use super::template::{Escape, RenderContext, render};
use crate::errors::{ClickTrailError, Result};
use crate::storage::models::{HttpMethod, PostbackProfile};

const MASKED: &str = "***";

/// 构造请求所需的全局参数
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub user_agent: String,
    pub default_timeout_ms: u64,
}

/// 渲染完成的出站请求
#[derive(Debug, Clone, PartialEq)]
pub struct PostbackRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    /// 需要在日志中遮盖的请求头
    secret_header: Option<String>,
}

impl PostbackRequest {
    /// 写入投递日志的请求头，认证头的值被遮盖
    pub fn logged_headers(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(name, value)| {
                let masked = self
                    .secret_header
                    .as_deref()
                    .is_some_and(|secret| secret.eq_ignore_ascii_case(name));
                if masked {
                    (name.clone(), MASKED.to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }
}

fn push_query(url: &mut String, name: &str, value: &str, encode: bool) {
    let sep = match url.rfind('?') {
        None => "?",
        Some(_) if url.ends_with('?') || url.ends_with('&') => "",
        Some(_) => "&",
    };
    url.push_str(sep);
    if encode {
        url.push_str(&urlencoding::encode(name));
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    } else {
        url.push_str(name);
        url.push('=');
        url.push_str(value);
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// 计算签名；启用但缺少 secret 时跳过签名
fn sign(
    profile: &PostbackProfile,
    ctx: &RenderContext<'_>,
    default_payload: &str,
) -> Result<Option<String>> {
    if !profile.hmac.enabled {
        return Ok(None);
    }
    let Some(secret) = non_empty(&profile.hmac.secret) else {
        warn!(
            "Postback profile {} enables HMAC without a secret, sending unsigned",
            profile.id
        );
        return Ok(None);
    };

    let payload = match non_empty(&profile.hmac.payload_template) {
        Some(template) => render(template, ctx, Escape::None),
        None => default_payload.to_string(),
    };
    hmac_sha256_hex(secret.as_bytes(), payload.as_bytes()).map(Some)
}

/// 按配置渲染出站请求
pub fn build_request(
    profile: &PostbackProfile,
    ctx: &RenderContext<'_>,
    settings: &RequestSettings,
) -> Result<PostbackRequest> {
    let ctx = ctx.with_status_map(&profile.status_map);
    let ctx = &ctx;

    let url_escape = if profile.url_encode && profile.method == HttpMethod::Get {
        Escape::Percent
    } else {
        Escape::None
    };
    let mut url = render(&profile.endpoint_url_template, ctx, url_escape);
    if url.trim().is_empty() {
        return Err(ClickTrailError::template(format!(
            "postback profile {} 的 endpoint 渲染为空",
            profile.id
        )));
    }

    let mut headers = vec![("User-Agent".to_string(), settings.user_agent.clone())];
    let mut secret_header = None;
    if let (Some(name), Some(value)) = (
        non_empty(&profile.auth.header_name),
        non_empty(&profile.auth.header_val),
    ) {
        headers.push((name.to_string(), value.to_string()));
        secret_header = Some(name.to_string());
    }

    let body = match profile.method {
        HttpMethod::Get => {
            for (name, template) in &profile.params_template {
                let value = render(template, ctx, Escape::None);
                push_query(&mut url, name, &value, profile.url_encode);
            }
            if let (Some(key), Some(val)) = (
                non_empty(&profile.auth.query_key),
                non_empty(&profile.auth.query_val),
            ) {
                push_query(&mut url, key, val, profile.url_encode);
            }
            if let Some(signature) = sign(profile, ctx, &url)? {
                push_query(&mut url, profile.hmac.param_name(), &signature, false);
            }
            None
        }
        HttpMethod::Post => {
            if let (Some(key), Some(val)) = (
                non_empty(&profile.auth.query_key),
                non_empty(&profile.auth.query_val),
            ) {
                push_query(&mut url, key, val, true);
            }
            headers.push(("Content-Type".to_string(), "application/json".to_string()));

            let body = match non_empty(&profile.body_template) {
                Some(template) => {
                    let body = render(template, ctx, Escape::Json);
                    if let Some(signature) = sign(profile, ctx, &body)? {
                        push_query(&mut url, profile.hmac.param_name(), &signature, false);
                    }
                    body
                }
                None => {
                    let mut object = serde_json::Map::new();
                    for (name, template) in &profile.params_template {
                        object.insert(
                            name.clone(),
                            serde_json::Value::String(render(template, ctx, Escape::None)),
                        );
                    }
                    let unsigned = serde_json::Value::Object(object.clone()).to_string();
                    if let Some(signature) = sign(profile, ctx, &unsigned)? {
                        object.insert(
                            profile.hmac.param_name().to_string(),
                            serde_json::Value::String(signature),
                        );
                    }
                    serde_json::Value::Object(object).to_string()
                }
            };
            Some(body)
        }
    };

    Url::parse(&url).map_err(|e| {
        ClickTrailError::template(format!(
            "postback profile {} 渲染出的 URL 无效: {} ({})",
            profile.id, url, e
        ))
    })?;

    let timeout_ms = if profile.timeout_ms == 0 {
        settings.default_timeout_ms
    } else {
        profile.timeout_ms
    };

    Ok(PostbackRequest {
        method: profile.method,
        url,
        body,
        headers,
        timeout: Duration::from_millis(timeout_ms),
        secret_header,
    })
}
