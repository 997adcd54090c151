//! 重试策略
//!
//! 只有 TransportError 且尚未达到最大尝试次数时重试，
//! 延迟为 `base · 2^(attempt-1)` 秒加上至多 `jitter_ratio` 比例的随机抖动。

use std::time::Duration;

use crate::storage::models::DeliveryStatus;

/// 指数上限，避免 2^n 溢出
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// 一次尝试结束后的去向
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttemptDecision {
    /// 成功或终态失败
    Done,
    /// 安排下一次尝试
    Retry { next_attempt: u32, delay: Duration },
}

/// 第 `attempt` 次失败后的退避时长（attempt 从 1 开始）
pub fn compute_backoff(attempt: u32, base_sec: u32, jitter_ratio: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    let delay_secs = u64::from(base_sec).saturating_mul(1u64 << exponent) as f64;

    let ratio = if jitter_ratio.is_finite() {
        jitter_ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let jitter = if ratio > 0.0 && delay_secs > 0.0 {
        rand::random_range(0.0..=delay_secs * ratio)
    } else {
        0.0
    };

    Duration::from_secs_f64(delay_secs + jitter)
}

/// 状态转移
pub fn next_state(
    status: DeliveryStatus,
    attempt: u32,
    max_attempts: u32,
    base_sec: u32,
    jitter_ratio: f64,
) -> AttemptDecision {
    match status {
        DeliveryStatus::TransportError if attempt < max_attempts => AttemptDecision::Retry {
            next_attempt: attempt + 1,
            delay: compute_backoff(attempt, base_sec, jitter_ratio),
        },
        _ => AttemptDecision::Done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_within_jitter() {
        for _ in 0..50 {
            let first = compute_backoff(1, 2, 0.2).as_secs_f64();
            let second = compute_backoff(2, 2, 0.2).as_secs_f64();
            let third = compute_backoff(3, 2, 0.2).as_secs_f64();
            assert!((2.0..=2.4).contains(&first), "first = {}", first);
            assert!((4.0..=4.8).contains(&second), "second = {}", second);
            assert!((8.0..=9.6).contains(&third), "third = {}", third);
        }
    }

    #[test]
    fn test_backoff_without_jitter_is_exact() {
        assert_eq!(compute_backoff(1, 5, 0.0), Duration::from_secs(5));
        assert_eq!(compute_backoff(4, 1, 0.0), Duration::from_secs(8));
        assert_eq!(compute_backoff(1, 0, 0.2), Duration::ZERO);
    }

    #[test]
    fn test_backoff_large_attempt_does_not_overflow() {
        let d = compute_backoff(u32::MAX, u32::MAX, 0.0);
        assert!(d > Duration::ZERO);
    }

    #[test]
    fn test_only_transport_errors_retry() {
        assert_eq!(
            next_state(DeliveryStatus::Success, 1, 3, 2, 0.0),
            AttemptDecision::Done
        );
        assert_eq!(
            next_state(DeliveryStatus::HttpError, 1, 3, 2, 0.0),
            AttemptDecision::Done
        );
        assert_eq!(
            next_state(DeliveryStatus::TransportError, 1, 3, 2, 0.0),
            AttemptDecision::Retry {
                next_attempt: 2,
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(
            next_state(DeliveryStatus::TransportError, 3, 3, 2, 0.0),
            AttemptDecision::Done
        );
        assert_eq!(
            next_state(DeliveryStatus::RenderError, 1, 3, 2, 0.0),
            AttemptDecision::Done
        );
    }
}
