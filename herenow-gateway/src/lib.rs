//! HereNow 实时接入网关
//!
//! - 登录登出与会话管理（Redis / 内存会话存储）
//! - 长连接生命周期：令牌校验、会话上线/下线、连接表维护
//! - 按 app id 分发消息到功能处理器

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod service;

pub use config::GatewayConfig;
pub use service::{ApplicationBootstrap, GatewayServices};
