//! User-Agent 解析
//!
//! 使用 woothee 提取浏览器、操作系统和设备类型，结果按 UA 字符串缓存。

use std::time::Duration;

use moka::sync::Cache;
use woothee::parser::Parser;

use crate::storage::models::DeviceInfo;

const UA_CACHE_MAX_CAPACITY: u64 = 10_000;
const UA_CACHE_TTL_SECS: u64 = 60 * 60;

/// 点击富化使用的 UA 解析接口
pub trait UserAgentParser: Send + Sync {
    fn parse(&self, user_agent: &str) -> DeviceInfo;
}

fn known(value: &str) -> Option<String> {
    if value.is_empty() || value == "UNKNOWN" {
        None
    } else {
        Some(value.to_string())
    }
}

/// woothee 的 category 归一为设备类型
fn device_type_from_category(category: &str) -> Option<String> {
    match category {
        "pc" => Some("desktop".to_string()),
        "smartphone" | "mobilephone" => Some("mobile".to_string()),
        "crawler" => Some("bot".to_string()),
        other => known(other),
    }
}

pub struct WootheeParser {
    cache: Cache<String, DeviceInfo>,
}

impl WootheeParser {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(UA_CACHE_MAX_CAPACITY)
                .time_to_live(Duration::from_secs(UA_CACHE_TTL_SECS))
                .build(),
        }
    }

    fn parse_uncached(user_agent: &str) -> DeviceInfo {
        let Some(result) = Parser::new().parse(user_agent) else {
            return DeviceInfo::default();
        };

        DeviceInfo {
            browser_name: known(result.name),
            browser_version: known(&result.version),
            os_name: known(result.os),
            os_version: known(&result.os_version),
            device_type: device_type_from_category(result.category),
        }
    }
}

impl Default for WootheeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl UserAgentParser for WootheeParser {
    fn parse(&self, user_agent: &str) -> DeviceInfo {
        if user_agent.trim().is_empty() {
            return DeviceInfo::default();
        }
        self.cache
            .get_with(user_agent.to_string(), || Self::parse_uncached(user_agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    #[test]
    fn test_parse_desktop_chrome() {
        let info = WootheeParser::new().parse(CHROME_WINDOWS);
        assert_eq!(info.browser_name.as_deref(), Some("Chrome"));
        assert_eq!(info.device_type.as_deref(), Some("desktop"));
        assert!(info.os_name.unwrap_or_default().starts_with("Windows"));
    }

    #[test]
    fn test_parse_mobile_safari() {
        let info = WootheeParser::new().parse(SAFARI_IPHONE);
        assert_eq!(info.device_type.as_deref(), Some("mobile"));
        assert_eq!(info.os_name.as_deref(), Some("iPhone"));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(WootheeParser::new().parse(""), DeviceInfo::default());
    }
}
