//! CLI interface module
//!
//! 命令直接访问数据库；`deliveries retry` 写入持久化重试队列，由运行中的服务执行。

pub mod commands;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cli::{Commands, ConfigCommands, DeliveryCommands, ProfileCommands};
use crate::services::DeliveryService;
use crate::storage::models::DeliveryFilter;
use crate::storage::{DeliveryStatus, SeaOrmStorage, StorageFactory};
use commands::{config_generate, import_profiles, list_deliveries, list_profiles, retry_delivery};

#[derive(Debug)]
pub enum CliError {
    StorageError(String),
    ParseError(String),
    CommandError(String),
}

impl CliError {
    pub fn format_simple(&self) -> String {
        match self {
            CliError::StorageError(msg) => format!("Storage error: {}", msg),
            CliError::ParseError(msg) => format!("Parse error: {}", msg),
            CliError::CommandError(msg) => format!("Command error: {}", msg),
        }
    }

    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        match self {
            CliError::StorageError(msg) => {
                format!("{} {}", "Storage error:".red().bold(), msg.white())
            }
            CliError::ParseError(msg) => {
                format!("{} {}", "Parse error:".yellow().bold(), msg.white())
            }
            CliError::CommandError(msg) => {
                format!("{} {}", "Command error:".red().bold(), msg.white())
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for CliError {}

impl From<crate::errors::ClickTrailError> for CliError {
    fn from(err: crate::errors::ClickTrailError) -> Self {
        match err {
            crate::errors::ClickTrailError::Validation(_)
            | crate::errors::ClickTrailError::DateParse(_)
            | crate::errors::ClickTrailError::Serialization(_) => {
                CliError::ParseError(err.to_string())
            }
            crate::errors::ClickTrailError::NotFound(_) => CliError::CommandError(err.to_string()),
            _ => CliError::StorageError(err.to_string()),
        }
    }
}

fn parse_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>, CliError> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| CliError::ParseError(format!("invalid time '{}': {}", s, e)))
    })
    .transpose()
}

fn delivery_service(storage: &Arc<SeaOrmStorage>) -> Arc<DeliveryService> {
    Arc::new(DeliveryService::new(
        storage.clone(),
        storage.clone(),
        storage.clone(),
        storage.clone(),
        None,
    ))
}

/// 执行 clap 解析出的子命令（`serve` 由 main 处理）
pub async fn run_cli_command(cmd: Commands) -> Result<(), CliError> {
    // 生成配置不需要数据库连接
    if let Commands::Config {
        action: ConfigCommands::Generate { output_path, force },
    } = cmd
    {
        return config_generate(output_path, force).await;
    }

    let storage = StorageFactory::create()
        .await
        .map_err(|e| CliError::StorageError(e.to_string()))?;

    match cmd {
        Commands::Profiles { action } => match action {
            ProfileCommands::List { json } => list_profiles(storage, json).await,
            ProfileCommands::Import { file_path } => import_profiles(storage, file_path).await,
        },

        Commands::Deliveries { action } => match action {
            DeliveryCommands::List {
                profile_id,
                status,
                event_id,
                click_id,
                chain_id,
                from,
                to,
                limit,
                offset,
                json,
            } => {
                let status = status
                    .map(|s| {
                        s.parse::<DeliveryStatus>()
                            .map_err(|_| CliError::ParseError(format!("unknown status '{}'", s)))
                    })
                    .transpose()?;
                let filter = DeliveryFilter {
                    profile_id,
                    status,
                    event_id,
                    click_id,
                    chain_id,
                    from: parse_time(from)?,
                    to: parse_time(to)?,
                    limit: Some(limit),
                    offset: Some(offset),
                };
                list_deliveries(delivery_service(&storage), filter, json).await
            }
            DeliveryCommands::Retry { id } => retry_delivery(delivery_service(&storage), id).await,
        },

        Commands::Config { .. } => unreachable!("handled above"),

        Commands::Serve => Err(CliError::CommandError(
            "serve is handled by the server runtime".to_string(),
        )),
    }
}
