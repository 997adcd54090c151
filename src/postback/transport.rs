//! 出站 HTTP 传输
//!
//! `PostbackTransport` 是执行器唯一的网络出口，测试中替换为 mock。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;
use ureq::Agent;

use super::request::PostbackRequest;
use crate::storage::models::{DeliveryStatus, HttpMethod};

/// 收到的 HTTP 响应（任意状态码）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// 没有拿到响应：连接失败、DNS、超时等
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(f, "timeout: {}", self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for TransportError {}

pub type TransportResult = std::result::Result<TransportResponse, TransportError>;

#[async_trait]
pub trait PostbackTransport: Send + Sync {
    async fn send(&self, request: &PostbackRequest) -> TransportResult;
}

/// 单次投递结果分类
///
/// 2xx/3xx 为成功，其余状态码为 HttpError，没有响应为 TransportError。
/// 只有 TransportError 会重试。
pub fn classify_outcome(result: &TransportResult) -> DeliveryStatus {
    match result {
        Ok(resp) if (200..400).contains(&resp.status) => DeliveryStatus::Success,
        Ok(_) => DeliveryStatus::HttpError,
        Err(_) => DeliveryStatus::TransportError,
    }
}

/// 基于 ureq 的阻塞传输，在 blocking 线程池中执行
#[derive(Clone)]
pub struct UreqTransport {
    agent: Arc<Agent>,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent: Arc::new(agent),
        }
    }

    fn send_blocking(agent: &Agent, request: &PostbackRequest) -> TransportResult {
        let timeout = Some(request.timeout);
        let result = match request.method {
            HttpMethod::Get => {
                let mut builder = agent
                    .get(&request.url)
                    .config()
                    .timeout_global(timeout)
                    .build();
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Post => {
                let mut builder = agent
                    .post(&request.url)
                    .config()
                    .timeout_global(timeout)
                    .build();
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match request.body {
                    Some(ref body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        match result {
            Ok(mut resp) => {
                let status = resp.status().as_u16();
                let body = resp.body_mut().read_to_string().unwrap_or_default();
                trace!("Postback {} {} -> {}", request.method, request.url, status);
                Ok(TransportResponse { status, body })
            }
            Err(ureq::Error::Timeout(t)) => Err(TransportError::timeout(t.to_string())),
            Err(e) => Err(TransportError::new(e.to_string())),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostbackTransport for UreqTransport {
    async fn send(&self, request: &PostbackRequest) -> TransportResult {
        let agent = Arc::clone(&self.agent);
        let request = request.clone();
        tokio::task::spawn_blocking(move || Self::send_blocking(&agent, &request))
            .await
            .unwrap_or_else(|e| Err(TransportError::new(format!("spawn_blocking failed: {}", e))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> TransportResult {
        Ok(TransportResponse {
            status,
            body: String::new(),
        })
    }

    #[test]
    fn test_classify_outcome() {
        assert_eq!(classify_outcome(&response(200)), DeliveryStatus::Success);
        assert_eq!(classify_outcome(&response(204)), DeliveryStatus::Success);
        assert_eq!(classify_outcome(&response(302)), DeliveryStatus::Success);
        assert_eq!(classify_outcome(&response(404)), DeliveryStatus::HttpError);
        assert_eq!(classify_outcome(&response(500)), DeliveryStatus::HttpError);
        assert_eq!(classify_outcome(&response(199)), DeliveryStatus::HttpError);
        assert_eq!(
            classify_outcome(&Err(TransportError::timeout("4s"))),
            DeliveryStatus::TransportError
        );
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(TransportError::new("refused").to_string(), "refused");
        assert_eq!(TransportError::timeout("global").to_string(), "timeout: global");
    }
}
