//! sub2 结构化格式解析
//!
//! 格式：`key-value|key2-value2`，只保留允许列表中的 key，
//! 未知 key 和格式错误的片段直接丢弃。

use std::collections::{BTreeMap, HashSet};

/// 允许列表（key 统一小写比较）
#[derive(Debug, Clone, Default)]
pub struct Sub2AllowList {
    keys: HashSet<String>,
}

impl Sub2AllowList {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| k.as_ref().trim().to_ascii_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

/// 解析 sub2，value 中允许出现 `-`（只按第一个 `-` 切分）
pub fn parse_sub2(raw: &str, allow: &Sub2AllowList) -> BTreeMap<String, String> {
    raw.split('|')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('-')?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            (!value.is_empty() && allow.contains(&key)).then(|| (key, value.to_string()))
        })
        .collect()
}
