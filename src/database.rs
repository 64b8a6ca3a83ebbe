//! # 数据库连接管理
//!
//! 提供共享的 PostgreSQL 连接池句柄与存活探测。
//!
//! 句柄可能为空：未配置数据库、启动时连接失败或探测失败后都会清空，
//! 调用方把空句柄视为 `ServiceUnavailable`。下一次探测成功后重新建立连接池。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::PostgresConfig;
use crate::error::{HereNowError, InfraResult, Result};

/// 创建PostgreSQL连接池
pub async fn create_db_pool(config: &PostgresConfig, database_url: &str) -> InfraResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections.unwrap_or(20))
        .min_connections(config.min_connections.unwrap_or(1))
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .context("failed to connect to postgres")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("postgres connection test failed")?;

    info!("Database connection pool created");
    Ok(pool)
}

/// 拼接带 schema 的表名（schema 来自配置，不能参数化绑定）
pub fn qualified_table(schema: &str, table: &str) -> Result<String> {
    let valid = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if !valid(schema) || !valid(table) {
        return Err(HereNowError::internal(format!(
            "invalid table identifier: {schema}.{table}"
        )));
    }
    Ok(format!("{schema}.{table}"))
}

/// 共享数据库句柄
pub struct DatabaseHandle {
    config: PostgresConfig,
    pool: RwLock<Option<PgPool>>,
}

impl DatabaseHandle {
    pub fn new(config: PostgresConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    /// 使用已有连接池构造
    pub fn with_pool(config: PostgresConfig, pool: PgPool) -> Self {
        Self {
            config,
            pool: RwLock::new(Some(pool)),
        }
    }

    /// 未配置数据库的空句柄
    pub fn disconnected() -> Self {
        Self::new(PostgresConfig::default())
    }

    pub fn schema(&self) -> &str {
        self.config.schema()
    }

    /// `schema.table`，schema 只允许字母、数字与下划线
    pub fn table(&self, table: &str) -> Result<String> {
        qualified_table(self.schema(), table)
    }

    /// 建立连接池并写入句柄
    pub async fn connect(&self) -> InfraResult<()> {
        let url = self
            .config
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("postgres url is not configured"))?;
        let pool = create_db_pool(&self.config, url).await?;
        *self.pool.write().await = Some(pool);
        Ok(())
    }

    /// 当前连接池（可能为空）
    pub async fn pool(&self) -> Option<PgPool> {
        self.pool.read().await.clone()
    }

    /// 获取连接池，空句柄返回 `ServiceUnavailable`
    pub async fn require(&self) -> Result<PgPool> {
        self.pool()
            .await
            .ok_or_else(|| HereNowError::unavailable("Database unavailable"))
    }

    pub async fn is_available(&self) -> bool {
        self.pool.read().await.is_some()
    }

    /// 探测一次数据库存活状态，返回探测后是否可用
    pub async fn probe(&self) -> bool {
        let current = self.pool().await;
        match current {
            Some(pool) => match sqlx::query("SELECT 1").execute(&pool).await {
                Ok(_) => true,
                Err(err) => {
                    error!(error = %err, "database heartbeat failed, dropping connection pool");
                    *self.pool.write().await = None;
                    pool.close().await;
                    false
                }
            },
            None => {
                if self.config.url.is_none() {
                    return false;
                }
                match self.connect().await {
                    Ok(()) => {
                        info!("database connection restored");
                        true
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "database still unavailable");
                        false
                    }
                }
            }
        }
    }

    /// 启动后台心跳任务
    pub fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let handle = Arc::clone(self);
        let period = Duration::from_secs(self.config.heartbeat_seconds());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                handle.probe().await;
            }
        })
    }
}
