//! 客户端 IP 解析
//!
//! 点击摄入时用于确定访问者的真实 IP：
//! - 显式配置的可信代理（单 IP 或 CIDR）
//! - 未配置时自动信任私有地址上的反向代理

use std::net::{IpAddr, SocketAddr};

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;
use tracing::debug;

/// 检查 IP 是否为私有地址或 localhost
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
        }
    }
}

/// 解析 `ip` 或 `ip:port`
pub fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<SocketAddr>()
        .map(|s| s.ip())
        .or_else(|_| raw.parse::<IpAddr>())
        .ok()
}

/// 检查 IP 是否在可信代理列表中
pub fn is_trusted_proxy(ip: &IpAddr, trusted_proxies: &[String]) -> bool {
    trusted_proxies.iter().any(|proxy| {
        if proxy.contains('/') {
            ip_in_cidr(ip, proxy)
        } else {
            proxy.parse::<IpAddr>().is_ok_and(|p| p == *ip)
        }
    })
}

/// CIDR 检查
pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix_len)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(prefix_len) = prefix_len.parse::<u32>() else {
        return false;
    };
    let Ok(network_addr) = network.parse::<IpAddr>() else {
        return false;
    };

    match (ip, network_addr) {
        (IpAddr::V4(ip), IpAddr::V4(net)) if prefix_len <= 32 => {
            let mask = u32::MAX.checked_shl(32 - prefix_len).unwrap_or(0);
            (u32::from(*ip) & mask) == (u32::from(net) & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) if prefix_len <= 128 => {
            let mask = u128::MAX.checked_shl(128 - prefix_len).unwrap_or(0);
            (u128::from(*ip) & mask) == (u128::from(net) & mask)
        }
        _ => false,
    }
}

/// 从请求头提取转发的 IP（X-Forwarded-For 优先，其次 X-Real-IP）
pub fn forwarded_ip_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// 根据连接地址和转发头决定客户端 IP
///
/// 1. 显式配置 trusted_proxies 且匹配 → 使用转发头
/// 2. 未配置 trusted_proxies 且连接来自私有地址 → 使用转发头
/// 3. 其他情况 → 使用连接 IP，防止伪造
pub fn resolve_client_ip(
    peer: Option<&str>,
    forwarded: Option<String>,
    trusted_proxies: &[String],
) -> Option<String> {
    let Some(peer_ip) = peer.and_then(parse_ip) else {
        return forwarded.filter(|f| parse_ip(f).is_some());
    };

    let trust_forwarded = if trusted_proxies.is_empty() {
        is_private_or_local(&peer_ip)
    } else {
        is_trusted_proxy(&peer_ip, trusted_proxies)
    };

    if trust_forwarded
        && let Some(real_ip) = forwarded.as_deref().and_then(parse_ip)
    {
        debug!("Trusted proxy {} forwarded client IP {}", peer_ip, real_ip);
        return Some(real_ip.to_string());
    }

    Some(peer_ip.to_string())
}

/// 从 HttpRequest 提取真实客户端 IP
pub fn extract_client_ip(req: &HttpRequest, trusted_proxies: &[String]) -> Option<String> {
    let peer = req.peer_addr().map(|addr| addr.ip().to_string());
    resolve_client_ip(
        peer.as_deref(),
        forwarded_ip_from_headers(req.headers()),
        trusted_proxies,
    )
}
