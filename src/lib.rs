//! clicktrail - affiliate click tracking and postback delivery
//!
//! 记录点击与转化事件，并按回传配置把事件投递给广告主/联盟网络。
//!
//! # Architecture
//! - `storage`: SeaORM 存储与窄接口 trait
//! - `services`: 点击/事件摄入与投递日志的业务逻辑
//! - `postback`: 回传引擎（匹配、模板、签名、发送、重试）
//! - `api`: HTTP 接口与中间件
//! - `interfaces`: CLI
//! - `config`: 配置
//! - `runtime`: 启动、关闭与运行模式
//! - `system`: 日志

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod postback;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;
