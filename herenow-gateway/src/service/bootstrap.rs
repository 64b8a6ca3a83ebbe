//! 应用启动器 - 负责依赖注入和服务启动

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use herenow_core::auth::TokenService;
use herenow_core::config::HereNowAppConfig;
use herenow_core::database::DatabaseHandle;
use herenow_hotspot::{HereNowHandler, PostgresHotspotRepository};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::GatewayServices;
use crate::application::MessageDispatcher;
use crate::config::GatewayConfig;
use crate::domain::{SessionStore, UserDirectory};
use crate::infrastructure::session_store::in_memory::InMemorySessionStore;
use crate::infrastructure::session_store::redis::RedisSessionStore;
use crate::infrastructure::user_directory::postgres::PostgresUserDirectory;
use crate::interface::http;

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub config: GatewayConfig,
    pub router: Router,
    pub services: GatewayServices,
    pub database: Arc<DatabaseHandle>,
    pub heartbeat: JoinHandle<()>,
}

/// 应用启动器
pub struct ApplicationBootstrap;

impl ApplicationBootstrap {
    /// 运行应用的主入口点
    pub async fn run(config: &HereNowAppConfig) -> Result<()> {
        let context = Self::create_context(config).await?;

        info!(
            name = %context.config.service_name,
            version = %context.config.version,
            "starting herenow gateway"
        );

        let result = http::serve(context.router, &context.config.listen_addr, shutdown_signal()).await;

        context.heartbeat.abort();
        if let Some(pool) = context.database.pool().await {
            pool.close().await;
        }
        info!("gateway stopped");
        result
    }

    /// 创建应用上下文
    pub async fn create_context(config: &HereNowAppConfig) -> Result<ApplicationContext> {
        let gateway_config = GatewayConfig::from_app_config(config);
        let tokens = Arc::new(TokenService::from_config(&config.auth)?);

        let database = Arc::new(DatabaseHandle::new(config.postgres.clone()));
        if config.postgres.url.is_some() {
            match database.connect().await {
                Ok(()) => info!("✅ PostgreSQL connected"),
                Err(err) => warn!(
                    error = %format!("{err:#}"),
                    "PostgreSQL unavailable at startup, heartbeat will retry"
                ),
            }
        } else {
            warn!("postgres url not configured, logins other than guest will fail");
        }
        let heartbeat = database.spawn_heartbeat();

        let session_store = Self::build_session_store(&gateway_config);
        let users: Arc<dyn UserDirectory> = Arc::new(PostgresUserDirectory::new(database.clone()));

        let hotspots = Arc::new(PostgresHotspotRepository::new(
            database.clone(),
            gateway_config.hotspot_schema.clone(),
        ));
        let dispatcher = MessageDispatcher::new().with_handler(Arc::new(HereNowHandler::new(
            hotspots,
            gateway_config.nearby_radius_meters,
        )));

        let services = GatewayServices::new(
            tokens,
            session_store,
            users,
            dispatcher,
            gateway_config.guest_ttl_seconds,
        );
        let router = http::router(
            services.http_state(gateway_config.service_name.clone(), gateway_config.version.clone()),
        );

        Ok(ApplicationContext {
            config: gateway_config,
            router,
            services,
            database,
            heartbeat,
        })
    }

    fn build_session_store(config: &GatewayConfig) -> Arc<dyn SessionStore> {
        if let Some(redis_url) = &config.session_store_redis_url {
            match redis::Client::open(redis_url.as_str()) {
                Ok(client) => {
                    info!(prefix = %config.session_key_prefix, "using redis session store");
                    return Arc::new(RedisSessionStore::new(
                        client,
                        config.session_key_prefix.clone(),
                        config.session_ttl_seconds,
                    ));
                }
                Err(err) => {
                    warn!(
                        ?err,
                        %redis_url,
                        "failed to initialize redis session store, falling back to memory"
                    );
                }
            }
        } else {
            warn!("redis url not configured, sessions are kept in memory");
        }
        Arc::new(InMemorySessionStore::new())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => warn!(error = %err, "failed to listen for shutdown signal"),
    }
}
