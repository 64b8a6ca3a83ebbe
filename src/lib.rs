//! HereNow Core 公共库
//!
//! 提供统一的配置加载、错误类型、日志初始化、令牌服务与数据库句柄

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod feature;
pub mod tracing;
pub mod utils;

pub use auth::{AccessClaims, TokenError, TokenService, TokenSubject, has_privilege};
pub use config::{
    AuthConfig, ConfigManager, HereNowAppConfig, HotspotConfig, LogFormat, LoggingConfig, PostgresConfig,
    RedisConfig, ServerConfig, app_config, load_config, load_config_uncached,
};
pub use database::DatabaseHandle;
pub use error::{ErrorCode, HereNowError, InfraResult, InfraResultExt, Result};
pub use feature::FeatureHandler;
