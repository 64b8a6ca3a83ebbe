//! 会话管理（管理端）

use std::sync::Arc;

use herenow_core::auth::{AccessClaims, DELETE_SESSION, READ_SESSION};
use herenow_core::error::Result;
use tracing::info;

use super::auth_service::AuthService;
use crate::domain::{ConnectionInfo, ConnectionRegistry, Session, SessionStore};

/// 管理端使用的会话模式（相对会话 key 命名空间的全部 key）
const ALL_SESSIONS: &str = "*";

pub struct SessionAdminService {
    session_store: Arc<dyn SessionStore>,
    registry: Arc<ConnectionRegistry>,
}

impl SessionAdminService {
    pub fn new(session_store: Arc<dyn SessionStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            session_store,
            registry,
        }
    }

    pub async fn list(&self, claims: &AccessClaims) -> Result<Vec<Session>> {
        AuthService::require_privilege(claims, READ_SESSION)?;
        self.session_store.list(ALL_SESSIONS).await
    }

    pub async fn delete(&self, claims: &AccessClaims, session_id: &str) -> Result<()> {
        AuthService::require_privilege(claims, DELETE_SESSION)?;
        self.session_store.delete(session_id).await?;
        info!(session_id = %session_id, by = %claims.user_id(), "Session deleted");
        Ok(())
    }

    pub async fn delete_all(&self, claims: &AccessClaims) -> Result<u64> {
        AuthService::require_privilege(claims, DELETE_SESSION)?;
        let deleted = self.session_store.delete_all(ALL_SESSIONS).await?;
        info!(deleted, by = %claims.user_id(), "All sessions deleted");
        Ok(deleted)
    }

    /// 当前连接表快照
    pub fn connections(&self, claims: &AccessClaims) -> Result<Vec<ConnectionInfo>> {
        AuthService::require_privilege(claims, READ_SESSION)?;
        Ok(self.registry.snapshot())
    }
}
