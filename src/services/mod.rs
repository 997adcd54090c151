//! Service layer for business logic
//!
//! 点击/事件摄入与投递日志的业务逻辑，HTTP 接口与 CLI 共用。

pub mod click_service;
pub mod delivery_service;
pub mod event_service;
pub mod geoip;
pub mod sub_params;
pub mod user_agent;

pub use click_service::{ClickOutcome, ClickRequest, ClickService, ClickSettings};
pub use delivery_service::{DeliveryService, RetryTriggered};
pub use event_service::{EventRequest, EventResult, EventService, EventStatus};
pub use geoip::{GeoIpProvider, GeoResolver};
pub use sub_params::{Sub2AllowList, parse_sub2};
pub use user_agent::{UserAgentParser, WootheeParser};
