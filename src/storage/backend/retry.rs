//! 数据库瞬时错误重试
//!
//! 归因写入与投递日志都走这里：瞬时错误（锁冲突、连接池耗尽、断线）
//! 按指数退避重试，重试耗尽后返回 `StorageUnavailable`，
//! 让摄入接口以 503 告知调用方稍后重发；其他错误直接转换返回。

use sea_orm::DbErr;
use sea_orm::error::RuntimeErr;
use std::future::Future;
use std::ops::Deref;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{ClickTrailError, Result};

/// 数据库错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorClass {
    /// 稍后重试可能成功
    Transient,
    /// 重试无意义（约束冲突、SQL 错误、记录不存在等）
    Permanent,
}

/// 可重试的数据库错误码
const TRANSIENT_CODES: &[&str] = &[
    // MySQL: 死锁、锁等待超时、连接断开
    "1213", "1205", "2006", "2013",
    // PostgreSQL: 序列化失败、死锁、连接异常、服务器关闭中
    "40001", "40P01", "08000", "08006", "57P01",
    // SQLite: BUSY、LOCKED
    "5", "6",
];

/// 无错误码时按消息匹配
const TRANSIENT_MESSAGES: &[&str] = &[
    "deadlock",
    "lock wait timeout",
    "database is locked",
    "serialization failure",
    "pool timed out",
    "connection reset",
    "broken pipe",
];

pub fn classify(err: &DbErr) -> DbErrorClass {
    let transient = match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(runtime) | DbErr::Query(runtime) => runtime_is_transient(runtime),
        _ => false,
    };
    if transient {
        DbErrorClass::Transient
    } else {
        DbErrorClass::Permanent
    }
}

fn runtime_is_transient(err: &RuntimeErr) -> bool {
    match err {
        RuntimeErr::SqlxError(sqlx_err) => {
            let code = sqlx_err
                .deref()
                .as_database_error()
                .and_then(|db_err| db_err.code());
            match code {
                Some(code) => TRANSIENT_CODES.contains(&code.as_ref()),
                None => message_is_transient(&sqlx_err.to_string()),
            }
        }
        RuntimeErr::Internal(msg) => message_is_transient(msg),
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn message_is_transient(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    TRANSIENT_MESSAGES.iter().any(|needle| msg.contains(needle))
}

/// 重试参数（来自 `[database]` 配置）
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    /// 首次执行之外的最大重试次数
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    pub fn from_config(config: &crate::config::DatabaseConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// 第 `retry` 次重试前的等待时间：`base * 2^(retry-1)`，封顶后加 0-25% 抖动
    fn delay_before(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        let capped = self
            .base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms);
        Duration::from_millis(capped + rand::random_range(0..=capped / 4))
    }
}

/// 执行数据库操作，瞬时错误按退避重试
///
/// 重试耗尽返回 `StorageUnavailable`，永久错误立即返回 `DatabaseOperation`。
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, DbErr>>,
{
    let mut retries = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    debug!("'{}' succeeded after {} retries", operation_name, retries);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if classify(&err) == DbErrorClass::Permanent {
            return Err(err.into());
        }
        if retries >= config.max_retries {
            return Err(ClickTrailError::storage_unavailable(format!(
                "'{}' 在 {} 次尝试后仍失败: {}",
                operation_name,
                retries + 1,
                err
            )));
        }

        retries += 1;
        let delay = config.delay_before(retries);
        warn!(
            "'{}' hit a transient error (retry {}/{}): {}; waiting {:?}",
            operation_name, retries, config.max_retries, err, delay
        );
        tokio::time::sleep(delay).await;
    }
}
