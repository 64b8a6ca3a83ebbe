pub mod bootstrap;

use std::sync::Arc;

use herenow_core::auth::TokenService;

use crate::application::{AuthService, MessageDispatcher, SessionAdminService};
use crate::domain::{ConnectionRegistry, SessionStore, UserDirectory};
use crate::interface::connection::ConnectionLifecycle;
use crate::interface::http::HttpState;

pub use bootstrap::{ApplicationBootstrap, ApplicationContext};

/// 网关服务装配结果
#[derive(Clone)]
pub struct GatewayServices {
    pub registry: Arc<ConnectionRegistry>,
    pub auth: Arc<AuthService>,
    pub sessions: Arc<SessionAdminService>,
    pub lifecycle: Arc<ConnectionLifecycle>,
}

impl GatewayServices {
    pub fn new(
        tokens: Arc<TokenService>,
        session_store: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        dispatcher: MessageDispatcher,
        guest_ttl_seconds: u64,
    ) -> Self {
        // 每个网关实例独立持有自己的连接表
        let registry = Arc::new(ConnectionRegistry::new());
        let auth = Arc::new(AuthService::new(
            session_store.clone(),
            users.clone(),
            tokens.clone(),
            guest_ttl_seconds,
        ));
        let sessions = Arc::new(SessionAdminService::new(
            session_store.clone(),
            registry.clone(),
        ));
        let lifecycle = Arc::new(ConnectionLifecycle::new(
            tokens,
            session_store,
            users,
            registry.clone(),
            Arc::new(dispatcher),
        ));

        Self {
            registry,
            auth,
            sessions,
            lifecycle,
        }
    }

    pub fn http_state(&self, service_name: impl Into<String>, version: impl Into<String>) -> HttpState {
        HttpState {
            service_name: service_name.into(),
            version: version.into(),
            auth: self.auth.clone(),
            sessions: self.sessions.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}
