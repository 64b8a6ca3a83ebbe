//! HTTP 接口
//!
//! 登录登出、连接升级、会话管理与运行指标

pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::{delete, get, post};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::application::{AuthService, SessionAdminService};
use crate::interface::connection::ConnectionLifecycle;

#[derive(Clone)]
pub struct HttpState {
    pub service_name: String,
    pub version: String,
    pub auth: Arc<AuthService>,
    pub sessions: Arc<SessionAdminService>,
    pub lifecycle: Arc<ConnectionLifecycle>,
}

/// 按请求 Origin 回写的 CORS 配置，允许携带凭据
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(handlers::handle_root))
        .route("/metrics", get(handlers::handle_metrics))
        .route("/login", post(handlers::handle_login))
        .route("/logout", post(handlers::handle_logout))
        .route("/connect", get(handlers::handle_connect))
        .route(
            "/sessions",
            get(handlers::handle_list_sessions).delete(handlers::handle_delete_all_sessions),
        )
        .route("/session/{id}", delete(handlers::handle_delete_session))
        .route("/connections", get(handlers::handle_connections))
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// 启动 HTTP 服务，直到 `shutdown` 完成
pub async fn serve<F>(router: Router, addr: &str, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting service");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}
