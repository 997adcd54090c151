//! Profile matching
//!
//! 纯函数：给定候选配置和归因链，返回应投递的配置，
//! 顺序为 flow > offer > campaign > global，同级按 priority 升序，再按 id 升序。

use crate::storage::models::{PostbackProfile, ScopeChain};

/// 选择并排序匹配的配置
///
/// `filter_revenue_gt0` 的配置在 revenue 缺失或 <= 0 时被排除。
pub fn match_profiles(
    candidates: Vec<PostbackProfile>,
    chain: &ScopeChain,
    revenue: Option<f64>,
) -> Vec<PostbackProfile> {
    let has_positive_revenue = revenue.is_some_and(|r| r > 0.0);

    let mut matched: Vec<PostbackProfile> = candidates
        .into_iter()
        .filter(|p| p.enabled)
        .filter(|p| p.scope.matches(chain))
        .filter(|p| !p.filter_revenue_gt0 || has_positive_revenue)
        .collect();

    matched.sort_by(|a, b| {
        a.scope
            .specificity()
            .cmp(&b.scope.specificity())
            .then(a.priority.cmp(&b.priority))
            .then(a.id.cmp(&b.id))
    });
    matched
}
