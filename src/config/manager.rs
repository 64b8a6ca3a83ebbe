//! 配置管理器 - 负责处理不同环境下的配置覆盖
//!
//! - 加载 `config/environments/{HERENOW_ENV}.toml` 环境配置
//! - 使用环境变量覆盖单项配置（部署时注入密钥、连接串）

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use toml::Value;

use super::{HereNowAppConfig, merge_value};

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取当前环境名称，默认为 "development"
    pub fn get_environment() -> String {
        env::var("HERENOW_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// 根据环境加载特定配置并合并到基础配置中
    pub fn load_environment_config(base_config: &mut HereNowAppConfig) -> Result<()> {
        let env_name = Self::get_environment();
        let env_config_path = format!("config/environments/{}.toml", env_name);

        if !Path::new(&env_config_path).exists() {
            return Ok(());
        }

        let content = fs::read_to_string(&env_config_path)
            .with_context(|| format!("无法读取环境配置文件: {}", env_config_path))?;
        let overlay: Value = toml::from_str(&content)
            .with_context(|| format!("无效的环境配置格式: {}", env_config_path))?;

        let mut merged = Value::try_from(&*base_config)
            .with_context(|| "无法序列化当前配置".to_string())?;
        merge_value(&mut merged, overlay);
        *base_config = merged
            .try_into()
            .with_context(|| format!("合并环境配置失败: {}", env_config_path))?;
        Ok(())
    }

    /// 使用环境变量覆盖配置
    ///
    /// 支持：`JWT_SECRET`、`REDIS_URL`、`DATABASE_URL`、`DB_SCHEMA`、`PORT`
    pub fn apply_env_overrides<F>(config: &mut HereNowAppConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = non_empty("JWT_SECRET") {
            config.auth.jwt_secret = Some(secret);
        }
        if let Some(url) = non_empty("REDIS_URL") {
            config.redis.url = Some(url);
        }
        if let Some(url) = non_empty("DATABASE_URL") {
            config.postgres.url = Some(url);
        }
        if let Some(schema) = non_empty("DB_SCHEMA") {
            config.postgres.schema = Some(schema);
        }
        if let Some(port) = non_empty("PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
            config.server.port = port;
        }
    }
}
