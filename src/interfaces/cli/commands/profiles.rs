//! Postback profile commands
//!
//! 导入文件是一个 JSON 数组，作用域使用扁平的 `scope_type` / `scope_id`。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use colored::Colorize;
use serde::Deserialize;

use crate::interfaces::cli::CliError;
use crate::storage::SeaOrmStorage;
use crate::storage::models::{HmacSettings, HttpMethod, PostbackAuth, PostbackProfile, Scope};

fn default_true() -> bool {
    true
}
fn default_retries() -> u32 {
    3
}
fn default_backoff() -> u32 {
    2
}
fn default_timeout_ms() -> u64 {
    4000
}

/// 导入格式中的参数模板：对象或 [name, template] 数组均可
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ParamsTemplate {
    Pairs(Vec<(String, String)>),
    Map(BTreeMap<String, String>),
}

impl Default for ParamsTemplate {
    fn default() -> Self {
        ParamsTemplate::Pairs(Vec::new())
    }
}

impl ParamsTemplate {
    fn into_pairs(self) -> Vec<(String, String)> {
        match self {
            ParamsTemplate::Pairs(pairs) => pairs,
            ParamsTemplate::Map(map) => map.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfileImport {
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default = "default_scope_type")]
    pub scope_type: String,
    #[serde(default)]
    pub scope_id: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub method: HttpMethod,
    pub endpoint_url_template: String,
    #[serde(default)]
    pub params_template: ParamsTemplate,
    #[serde(default)]
    pub body_template: Option<String>,
    #[serde(default)]
    pub status_map: BTreeMap<String, String>,
    #[serde(default)]
    pub filter_revenue_gt0: bool,
    #[serde(default)]
    pub auth: PostbackAuth,
    #[serde(default)]
    pub hmac: HmacSettings,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_backoff")]
    pub backoff_base_sec: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub url_encode: bool,
}

fn default_scope_type() -> String {
    "global".to_string()
}

impl ProfileImport {
    pub fn into_profile(self) -> Result<PostbackProfile, String> {
        let scope = Scope::from_parts(&self.scope_type, self.scope_id.as_deref()).ok_or_else(
            || {
                format!(
                    "invalid scope '{}' / {:?} (global takes no id, campaign/offer/flow need one)",
                    self.scope_type, self.scope_id
                )
            },
        )?;
        if self.endpoint_url_template.trim().is_empty() {
            return Err("endpoint_url_template is empty".to_string());
        }
        if self.retries == 0 {
            return Err("retries must be at least 1".to_string());
        }

        let now = Utc::now();
        Ok(PostbackProfile {
            id: 0,
            name: self.name,
            owner_id: self.owner_id,
            scope,
            priority: self.priority,
            enabled: self.enabled,
            method: self.method,
            endpoint_url_template: self.endpoint_url_template,
            params_template: self.params_template.into_pairs(),
            body_template: self.body_template.filter(|b| !b.trim().is_empty()),
            status_map: self.status_map,
            filter_revenue_gt0: self.filter_revenue_gt0,
            auth: self.auth,
            hmac: self.hmac,
            retries: self.retries,
            backoff_base_sec: self.backoff_base_sec,
            timeout_ms: self.timeout_ms,
            url_encode: self.url_encode,
            created_at: now,
            updated_at: now,
        })
    }
}

pub async fn list_profiles(storage: Arc<SeaOrmStorage>, json: bool) -> Result<(), CliError> {
    let profiles = storage
        .list_profiles()
        .await
        .map_err(|e| CliError::CommandError(format!("Failed to load profiles: {}", e)))?;

    if json {
        let out = serde_json::to_string_pretty(&profiles)
            .map_err(|e| CliError::CommandError(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    if profiles.is_empty() {
        println!("{} No postback profiles found", "ℹ".bold().blue());
        return Ok(());
    }

    println!("{}", "Postback profiles:".bold().green());
    println!();
    for p in &profiles {
        let state = if p.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!(
            "  {} {} [{}] prio={} {} {} {}",
            format!("#{}", p.id).cyan(),
            p.name.bold(),
            p.scope.to_string().yellow(),
            p.priority,
            p.method,
            p.endpoint_url_template.blue().underline(),
            state
        );
    }
    println!();
    println!(
        "{} Total {} profiles",
        "ℹ".bold().blue(),
        profiles.len().to_string().green()
    );
    Ok(())
}

pub async fn import_profiles(storage: Arc<SeaOrmStorage>, file_path: String) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(&file_path).map_err(|e| {
        CliError::CommandError(format!("Failed to read '{}': {}", file_path, e))
    })?;
    let items: Vec<ProfileImport> = serde_json::from_str(&raw)
        .map_err(|e| CliError::ParseError(format!("Invalid profile file: {}", e)))?;

    let mut imported = 0usize;
    let mut failed = 0usize;
    for (index, item) in items.into_iter().enumerate() {
        let name = item.name.clone();
        let profile = match item.into_profile() {
            Ok(p) => p,
            Err(e) => {
                println!("  {} #{} {}: {}", "✗".red(), index, name, e);
                failed += 1;
                continue;
            }
        };
        match storage.insert_profile(&profile).await {
            Ok(saved) => {
                println!(
                    "  {} #{} {} [{}]",
                    "✓".green(),
                    saved.id,
                    saved.name,
                    saved.scope
                );
                imported += 1;
            }
            Err(e) => {
                println!("  {} #{} {}: {}", "✗".red(), index, name, e);
                failed += 1;
            }
        }
    }

    println!();
    println!(
        "{} Imported {} profiles, {} failed",
        "ℹ".bold().blue(),
        imported.to_string().green(),
        failed.to_string().red()
    );
    if failed > 0 {
        return Err(CliError::CommandError(format!(
            "{} profile(s) could not be imported",
            failed
        )));
    }
    Ok(())
}
