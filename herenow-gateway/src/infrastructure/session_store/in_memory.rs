use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use herenow_core::error::{HereNowError, Result};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::glob_match;
use crate::domain::{Session, SessionStore};

/// 内存会话存储（未配置 Redis 时使用，也用于测试）
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, mut session: Session) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        session.id = session_id.clone();
        self.inner.write().await.insert(session_id.clone(), session);
        Ok(session_id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.inner.read().await.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        match self.inner.write().await.remove(session_id) {
            Some(_) => Ok(()),
            None => Err(HereNowError::not_found(format!(
                "deleting session key not found: {session_id}"
            ))),
        }
    }

    async fn delete_all(&self, pattern: &str) -> Result<u64> {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|id, _| !glob_match(pattern, id));
        Ok((before - guard.len()) as u64)
    }

    async fn set_active(&self, session_id: &str, active: bool) -> Result<Option<Session>> {
        let mut guard = self.inner.write().await;
        match guard.get_mut(session_id) {
            Some(session) => {
                session.set_active(active, Utc::now());
                Ok(Some(session.clone()))
            }
            None => {
                warn!(session_id = %session_id, "session not found while updating status");
                Ok(None)
            }
        }
    }

    async fn list(&self, pattern: &str) -> Result<Vec<Session>> {
        let guard = self.inner.read().await;
        Ok(guard
            .iter()
            .filter(|(id, _)| glob_match(pattern, id))
            .map(|(_, session)| session.clone())
            .collect())
    }
}
