//! 模板渲染
//!
//! 仅支持 `{{ field }}` 替换（花括号内的空白忽略），未知或缺失字段渲染为空串。
//! 渲染上下文在每个事件上构造一次，按配置的 status_map 覆盖 `status`。

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::storage::models::{Click, Event};

/// 替换值的转义方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// 原样输出
    None,
    /// 百分号编码（URL 参数）
    Percent,
    /// JSON 字符串转义（不含两侧引号）
    Json,
}

impl Escape {
    fn apply<'a>(&self, value: &'a str) -> Cow<'a, str> {
        match self {
            Escape::None => Cow::Borrowed(value),
            Escape::Percent => urlencoding::encode(value),
            Escape::Json => {
                let quoted = serde_json::Value::String(value.to_string()).to_string();
                Cow::Owned(quoted[1..quoted.len() - 1].to_string())
            }
        }
    }
}

/// 单个事件的渲染上下文
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    event: &'a Event,
    click: &'a Click,
    status: Cow<'a, str>,
}

impl<'a> RenderContext<'a> {
    pub fn new(event: &'a Event, click: &'a Click) -> Self {
        Self {
            event,
            click,
            status: Cow::Borrowed(event.event_type.as_ref()),
        }
    }

    /// 按配置的状态映射覆盖 status，未映射时保留原始事件类型
    pub fn with_status_map(&self, status_map: &'a BTreeMap<String, String>) -> Self {
        let raw: &str = self.event.event_type.as_ref();
        let status = status_map
            .get(raw)
            .map(|s| Cow::Borrowed(s.as_str()))
            .unwrap_or_else(|| self.status.clone());
        Self {
            event: self.event,
            click: self.click,
            status,
        }
    }

    /// 查询字段值，未知字段返回 None
    pub fn field(&self, name: &str) -> Option<Cow<'a, str>> {
        let event = self.event;
        let click = self.click;
        let borrowed = |v: &'a Option<String>| v.as_deref().map(Cow::Borrowed);

        match name {
            "clickid" | "click_id" => Some(Cow::Borrowed(event.click_id.as_str())),
            "event_id" => Some(Cow::Borrowed(event.event_id.as_str())),
            "type" | "event_type" => Some(Cow::Borrowed(event.event_type.as_ref())),
            "status" => Some(self.status.clone()),
            "revenue" => event.revenue.map(|r| Cow::Owned(r.to_string())),
            "currency" => borrowed(&event.currency),
            "txid" => borrowed(&event.txid),
            "time_on_page_ms" => event.time_on_page_ms.map(|t| Cow::Owned(t.to_string())),
            "campaign_id" => borrowed(&click.campaign_id),
            "offer_id" => borrowed(&click.offer_id),
            "flow_id" => borrowed(&click.flow_id),
            "source_id" => borrowed(&click.source_id),
            "ip" => borrowed(&click.ip),
            "country" | "country_iso" => borrowed(&click.geo.country_iso),
            "region" => borrowed(&click.geo.region),
            "city" => borrowed(&click.geo.city),
            "isp" => borrowed(&click.geo.isp),
            "is_proxy" => click
                .geo
                .is_proxy
                .map(|p| Cow::Borrowed(if p { "true" } else { "false" })),
            "browser_name" => borrowed(&click.device.browser_name),
            "browser_version" => borrowed(&click.device.browser_version),
            "os_name" => borrowed(&click.device.os_name),
            "os_version" => borrowed(&click.device.os_version),
            "device_type" => borrowed(&click.device.device_type),
            "utm_source" => borrowed(&click.utm.source),
            "utm_medium" => borrowed(&click.utm.medium),
            "utm_campaign" => borrowed(&click.utm.campaign),
            "utm_term" => borrowed(&click.utm.term),
            "utm_content" => borrowed(&click.utm.content),
            "referrer" => borrowed(&click.referrer),
            "click_created_at" => Some(Cow::Owned(click.created_at.to_rfc3339())),
            "event_created_at" => Some(Cow::Owned(event.created_at.to_rfc3339())),
            "timestamp" => Some(Cow::Owned(event.created_at.timestamp().to_string())),
            other => {
                if let Some(key) = other.strip_prefix("sub2_") {
                    return click.sub2_params.get(key).map(|v| Cow::Borrowed(v.as_str()));
                }
                let n: usize = other.strip_prefix("sub")?.parse().ok()?;
                click.sub(n).map(Cow::Borrowed)
            }
        }
    }
}

/// 渲染模板
pub fn render(template: &str, ctx: &RenderContext<'_>, escape: Escape) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = rest[start + 2..start + 2 + len].trim();
        if let Some(value) = ctx.field(name) {
            out.push_str(&escape.apply(&value));
        }
        rest = &rest[start + 2 + len + 2..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::EventType;
    use chrono::{TimeZone, Utc};

    fn fixtures() -> (Event, Click) {
        let mut click = Click {
            click_id: "CLK123".to_string(),
            offer_id: Some("42".to_string()),
            ..Default::default()
        };
        click.subs[0] = Some("abc".to_string());
        click.sub2_params.insert("gclid".to_string(), "g-1".to_string());
        click.geo.country_iso = Some("DE".to_string());

        let event = Event {
            event_id: "evt-1".to_string(),
            click_id: "CLK123".to_string(),
            event_type: EventType::Deposit,
            revenue: Some(50.0),
            currency: Some("USD".to_string()),
            txid: None,
            time_on_page_ms: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        };
        (event, click)
    }

    #[test]
    fn test_substitutes_known_fields() {
        let (event, click) = fixtures();
        let ctx = RenderContext::new(&event, &click);
        assert_eq!(render("{{sub1}}", &ctx, Escape::None), "abc");
        assert_eq!(
            render("id={{ clickid }}&amt={{revenue}}&c={{country}}", &ctx, Escape::None),
            "id=CLK123&amt=50&c=DE"
        );
        assert_eq!(render("{{sub2_gclid}}", &ctx, Escape::None), "g-1");
        assert_eq!(render("{{timestamp}}", &ctx, Escape::None), "1735787045");
    }

    #[test]
    fn test_unknown_and_absent_fields_render_empty() {
        let (event, click) = fixtures();
        let ctx = RenderContext::new(&event, &click);
        assert_eq!(render("[{{nope}}]", &ctx, Escape::None), "[]");
        assert_eq!(render("[{{txid}}]", &ctx, Escape::None), "[]");
        assert_eq!(render("[{{sub9}}]", &ctx, Escape::None), "[]");
        assert_eq!(render("[{{sub0}}]", &ctx, Escape::None), "[]");
    }

    #[test]
    fn test_unclosed_placeholder_kept_literally() {
        let (event, click) = fixtures();
        let ctx = RenderContext::new(&event, &click);
        assert_eq!(render("a{{sub1", &ctx, Escape::None), "a{{sub1");
    }

    #[test]
    fn test_status_map() {
        let (event, click) = fixtures();
        let ctx = RenderContext::new(&event, &click);
        assert_eq!(render("{{status}}", &ctx, Escape::None), "deposit");

        let mut map = BTreeMap::new();
        map.insert("deposit".to_string(), "sale".to_string());
        let mapped = ctx.with_status_map(&map);
        assert_eq!(render("{{status}}", &mapped, Escape::None), "sale");
        assert_eq!(render("{{type}}", &mapped, Escape::None), "deposit");
    }

    #[test]
    fn test_escaping() {
        let (event, mut click) = fixtures();
        click.subs[0] = Some("a b&c\"d".to_string());
        let ctx = RenderContext::new(&event, &click);
        assert_eq!(render("{{sub1}}", &ctx, Escape::Percent), "a%20b%26c%22d");
        assert_eq!(
            render(r#"{"s":"{{sub1}}"}"#, &ctx, Escape::Json),
            r#"{"s":"a b&c\"d"}"#
        );
    }
}
