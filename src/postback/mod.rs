//! Postback delivery engine
//!
//! 匹配 → 渲染 → 签名 → 发送 → 分类 → 记录 → 重试。

pub mod executor;
pub mod matcher;
pub mod policy;
pub mod request;
pub mod scheduler;
pub mod signing;
pub mod template;
pub mod transport;

pub use executor::{DeliveryExecutor, EventDispatcher, ExecutorSettings, ShutdownSignal};
pub use matcher::match_profiles;
pub use request::{PostbackRequest, RequestSettings, build_request};
pub use scheduler::RetryScheduler;
pub use template::{Escape, RenderContext, render};
pub use transport::{
    PostbackTransport, TransportError, TransportResponse, TransportResult, UreqTransport,
    classify_outcome,
};
