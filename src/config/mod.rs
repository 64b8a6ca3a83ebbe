//! HereNow 配置模块
//!
//! 该模块提供了应用程序配置管理功能，包括：
//! - 配置文件 / 配置目录加载和解析
//! - 环境特定配置覆盖与环境变量覆盖
//! - Redis、PostgreSQL、认证、热点功能等配置定义

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use toml::Value;
use tracing::warn;

mod manager;
pub use manager::ConfigManager;

/// 全局应用配置实例，使用 OnceLock 确保只初始化一次
static APP_CONFIG: OnceLock<HereNowAppConfig> = OnceLock::new();

/// 服务描述
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceInfoConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_service_version")]
    pub version: String,
}

impl Default for ServiceInfoConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            version: default_service_version(),
        }
    }
}

/// HTTP / WebSocket 监听配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 优先）
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub with_target: bool,
    #[serde(default)]
    pub with_thread_ids: bool,
    #[serde(default)]
    pub with_file: bool,
    #[serde(default)]
    pub with_line_number: bool,
    /// 输出格式：`text` 或 `json`
    #[serde(default)]
    pub format: LogFormat,
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            format: LogFormat::Text,
        }
    }
}

/// Redis 会话存储配置
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RedisConfig {
    /// Redis 服务器地址，未配置时使用内存会话存储
    #[serde(default)]
    pub url: Option<String>,
    /// 会话 key 前缀
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// 会话过期时间（秒），默认不过期，会话只能显式删除
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl RedisConfig {
    pub fn key_prefix(&self) -> &str {
        self.key_prefix.as_deref().unwrap_or("session:")
    }
}

/// PostgreSQL 数据库配置
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PostgresConfig {
    /// 数据库连接 URL
    #[serde(default)]
    pub url: Option<String>,
    /// 最大连接数
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// 最小连接数
    #[serde(default)]
    pub min_connections: Option<u32>,
    /// 存活探测间隔（秒）
    #[serde(default)]
    pub heartbeat_seconds: Option<u64>,
    /// 用户表所在 schema
    #[serde(default)]
    pub schema: Option<String>,
}

impl PostgresConfig {
    pub fn heartbeat_seconds(&self) -> u64 {
        self.heartbeat_seconds.filter(|s| *s > 0).unwrap_or(30)
    }

    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or("ekhoes")
    }
}

/// 认证配置
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuthConfig {
    /// 令牌密钥
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// 令牌发行方
    #[serde(default)]
    pub issuer: Option<String>,
    /// 访客令牌有效期（秒）
    #[serde(default)]
    pub guest_ttl_seconds: Option<u64>,
}

impl AuthConfig {
    pub fn issuer(&self) -> &str {
        self.issuer.as_deref().unwrap_or("websocket-server")
    }

    pub fn guest_ttl_seconds(&self) -> u64 {
        self.guest_ttl_seconds.unwrap_or(24 * 60 * 60)
    }
}

/// here-now 热点功能配置
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HotspotConfig {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub nearby_radius_meters: Option<f64>,
}

impl HotspotConfig {
    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or("hn")
    }

    pub fn nearby_radius_meters(&self) -> f64 {
        self.nearby_radius_meters.unwrap_or(5000.0)
    }
}

/// HereNow 应用配置主结构体
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HereNowAppConfig {
    #[serde(default)]
    pub service: ServiceInfoConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub hotspot: HotspotConfig,
}

impl HereNowAppConfig {
    /// 监听地址
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.address, self.server.port)
    }

    /// 确保配置有默认值
    fn ensure_defaults(&mut self) {
        if self.server.address.is_empty() {
            self.server.address = default_address();
        }
        if self.server.port == 0 {
            self.server.port = default_port();
        }
    }
}

/// 加载配置
///
/// 未指定路径时依次尝试 `config/` 目录与 `config.toml`，都失败则使用默认配置；
/// 之后叠加环境配置与环境变量覆盖。
pub fn load_config(path: Option<&str>) -> &'static HereNowAppConfig {
    APP_CONFIG.get_or_init(|| load_config_uncached(path))
}

/// 加载配置但不写入全局实例（测试与 CLI 覆盖端口时使用）
pub fn load_config_uncached(path: Option<&str>) -> HereNowAppConfig {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => vec![PathBuf::from("config"), PathBuf::from("config.toml")],
    };

    let mut cfg = load_with_fallback(&candidates);
    if let Err(e) = ConfigManager::load_environment_config(&mut cfg) {
        warn!("failed to load environment config: {}", e);
    }
    ConfigManager::apply_env_overrides(&mut cfg, |key| env::var(key).ok());
    cfg.ensure_defaults();
    cfg
}

/// 获取应用配置
pub fn app_config() -> Option<&'static HereNowAppConfig> {
    APP_CONFIG.get()
}

/// 从 TOML 字符串解析配置
pub fn parse_config(content: &str) -> Result<HereNowAppConfig> {
    let mut cfg: HereNowAppConfig = toml::from_str(content).context("invalid config format")?;
    cfg.ensure_defaults();
    Ok(cfg)
}

fn load_with_fallback(candidates: &[PathBuf]) -> HereNowAppConfig {
    for path in candidates {
        match load_config_from_source(path) {
            Ok(cfg) => return cfg,
            Err(err) => {
                warn!("failed to load config from {}: {err}", path.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    HereNowAppConfig::default()
}

fn load_config_from_source(path: &Path) -> Result<HereNowAppConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let metadata = path
        .metadata()
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    if metadata.is_dir() {
        load_config_from_directory(path)
    } else {
        load_config_from_file(path)
    }
}

fn load_config_from_file(path: &Path) -> Result<HereNowAppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("invalid config: {}", path.display()))
}

/// 目录形式：`base.toml` + `overrides/*.toml`（按文件名顺序合并）
fn load_config_from_directory(path: &Path) -> Result<HereNowAppConfig> {
    let base_file = path.join("base.toml");
    if !base_file.exists() {
        return Err(anyhow!(
            "missing base configuration: {}",
            base_file.display()
        ));
    }

    let mut merged = load_toml_value(&base_file)?;
    if !merged.is_table() {
        return Err(anyhow!(
            "base configuration must be a table: {}",
            base_file.display()
        ));
    }

    merge_directory(&mut merged, &path.join("overrides"))?;

    let mut cfg: HereNowAppConfig = merged
        .try_into()
        .with_context(|| format!("invalid configuration after merging {}", path.display()))?;
    cfg.ensure_defaults();
    Ok(cfg)
}

fn merge_directory(root: &mut Value, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("unable to read config directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("toml"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let value = load_toml_value(&entry.path())?;
        merge_value(root, value);
    }

    Ok(())
}

fn load_toml_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config fragment {}", path.display()))?;
    let value: Value = toml::from_str(&content)
        .with_context(|| format!("invalid TOML content in fragment {}", path.display()))?;
    Ok(value)
}

/// 深度合并两个 TOML 值，overlay 中的标量覆盖 base
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}

fn default_service_name() -> String {
    "herenow-gateway".to_string()
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9876
}

fn default_log_level() -> String {
    "info".to_string()
}
