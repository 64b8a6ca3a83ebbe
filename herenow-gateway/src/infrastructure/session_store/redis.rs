use anyhow::{Context, Error};
use async_trait::async_trait;
use chrono::Utc;
use herenow_core::error::{ErrorCode, HereNowError, InfraResult, InfraResultExt, Result};
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::SessionStore;
use crate::domain::session::Session;

const SCAN_BATCH: usize = 100;

pub struct RedisSessionStore {
    client: redis::Client,
    manager: OnceCell<ConnectionManager>,
    key_prefix: String,
    ttl_seconds: Option<u64>,
}

impl RedisSessionStore {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>, ttl_seconds: Option<u64>) -> Self {
        Self {
            client,
            manager: OnceCell::new(),
            key_prefix: key_prefix.into(),
            ttl_seconds: ttl_seconds.filter(|ttl| *ttl > 0),
        }
    }

    /// 首次使用时建立连接，之后复用同一个 ConnectionManager
    async fn connection(&self) -> Result<ConnectionManager> {
        self.manager
            .get_or_try_init(|| async {
                ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(Error::new)
            })
            .await
            .cloned()
            .into_herenow(
                ErrorCode::ServiceUnavailable,
                "failed to open redis connection",
            )
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    fn session_id_from_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.key_prefix.as_str()).unwrap_or(key)
    }

    fn decode(raw: &str, session_id: &str) -> InfraResult<Session> {
        let mut session: Session = serde_json::from_str(raw).context("invalid session json")?;
        session.id = session_id.to_string();
        Ok(session)
    }

    async fn fetch_session(
        &self,
        conn: &mut ConnectionManager,
        session_id: &str,
    ) -> InfraResult<Option<Session>> {
        let payload: Option<String> = conn
            .get(self.session_key(session_id))
            .await
            .context("failed to get session")?;
        payload
            .map(|raw| Self::decode(&raw, session_id))
            .transpose()
    }

    /// 执行一次 SCAN，返回下一个游标与本批 key
    async fn scan_batch(
        &self,
        conn: &mut ConnectionManager,
        pattern: &str,
        cursor: u64,
    ) -> InfraResult<(u64, Vec<String>)> {
        redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(self.session_key(pattern))
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(conn)
            .await
            .context("scan error")
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, mut session: Session) -> Result<String> {
        let mut conn = self.connection().await?;

        let session_id = Uuid::new_v4().to_string();
        session.id = session_id.clone();
        let json = serde_json::to_string(&session)
            .into_herenow(ErrorCode::Internal, "failed to encode session json")?;

        let key = self.session_key(&session_id);
        let written: redis::RedisResult<()> = match self.ttl_seconds {
            Some(ttl) => conn.set_ex(&key, json, ttl).await,
            None => conn.set(&key, json).await,
        };
        written.into_herenow(ErrorCode::ServiceUnavailable, "failed to store session")?;

        info!(session_id = %session_id, user_id = %session.user.id, "session stored in redis");
        Ok(session_id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let mut conn = self.connection().await?;
        self.fetch_session(&mut conn, session_id)
            .await
            .into_herenow(ErrorCode::StoreError, "failed to fetch session")
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let removed: usize = conn
            .del(self.session_key(session_id))
            .await
            .into_herenow(ErrorCode::StoreError, "unable to remove key")?;

        if removed == 0 {
            return Err(HereNowError::not_found(format!(
                "deleting session key not found: {session_id}"
            )));
        }
        Ok(())
    }

    async fn delete_all(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys) = self
                .scan_batch(&mut conn, pattern, cursor)
                .await
                .into_herenow(ErrorCode::StoreError, "unable to scan sessions")?;

            if !keys.is_empty() {
                let removed: u64 = conn
                    .del(keys)
                    .await
                    .into_herenow(ErrorCode::StoreError, "delete error")?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        info!(pattern = %pattern, deleted, "sessions purged");
        Ok(deleted)
    }

    async fn set_active(&self, session_id: &str, active: bool) -> Result<Option<Session>> {
        let mut conn = self.connection().await?;

        let Some(mut session) = self
            .fetch_session(&mut conn, session_id)
            .await
            .into_herenow(ErrorCode::StoreError, "failed to fetch session")?
        else {
            warn!(session_id = %session_id, "session not found while updating status");
            return Ok(None);
        };

        session.set_active(active, Utc::now());
        let json = serde_json::to_string(&session)
            .into_herenow(ErrorCode::Internal, "failed to encode session json")?;

        // KEEPTTL 保留原有过期时间
        let _: () = redis::cmd("SET")
            .arg(self.session_key(session_id))
            .arg(json)
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await
            .into_herenow(ErrorCode::StoreError, "failed to update session")?;

        debug!(session_id = %session_id, status = session.status.as_str(), "session status updated");
        Ok(Some(session))
    }

    async fn list(&self, pattern: &str) -> Result<Vec<Session>> {
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut sessions = Vec::new();

        loop {
            let (next, keys) = self
                .scan_batch(&mut conn, pattern, cursor)
                .await
                .into_herenow(ErrorCode::StoreError, "unable to scan sessions")?;

            for key in keys {
                let payload: Option<String> = match conn.get(&key).await {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(key = %key, error = %err, "failed to read session key");
                        continue;
                    }
                };
                let Some(raw) = payload else {
                    continue;
                };
                match Self::decode(&raw, self.session_id_from_key(&key)) {
                    Ok(session) => sessions.push(session),
                    Err(err) => warn!(key = %key, error = %format!("{err:#}"), "skipping undecodable session"),
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(sessions)
    }
}
