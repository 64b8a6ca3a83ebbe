#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use herenow_core::auth::{TokenService, TokenSubject};
use herenow_core::error::{HereNowError, Result};
use herenow_gateway::GatewayServices;
use herenow_gateway::application::MessageDispatcher;
use herenow_gateway::domain::{Session, SessionStore, UserDirectory, UserRecord};
use herenow_gateway::infrastructure::session_store::in_memory::InMemorySessionStore;

pub const SECRET: &str = "integration-test-secret";
pub const ISSUER: &str = "websocket-server";

pub fn tokens() -> Arc<TokenService> {
    Arc::new(TokenService::new(SECRET, ISSUER))
}

struct FakeUser {
    id: String,
    name: String,
    password: String,
    privileges: String,
}

/// 内存用户目录
#[derive(Default)]
pub struct FakeUserDirectory {
    users: Mutex<HashMap<String, FakeUser>>,
    pub unavailable: AtomicBool,
    pub touches: AtomicUsize,
}

impl FakeUserDirectory {
    pub fn with_user(self, id: &str, name: &str, email: &str, password: &str, privileges: &str) -> Self {
        self.users.lock().unwrap().insert(
            email.to_lowercase(),
            FakeUser {
                id: id.to_string(),
                name: name.to_string(),
                password: password.to_string(),
                privileges: privileges.to_string(),
            },
        );
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn touch_count(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for FakeUserDirectory {
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<UserRecord>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(HereNowError::unavailable("Database unavailable"));
        }
        let users = self.users.lock().unwrap();
        Ok(users.get(&email.to_lowercase()).map(|user| UserRecord {
            id: user.id.clone(),
            name: user.name.clone(),
            password_match: user.password == password,
            roles: "user".to_string(),
            privileges: user.privileges.clone(),
        }))
    }

    async fn touch_last_access(&self, _user_id: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(HereNowError::unavailable("Database unavailable"));
        }
        self.touches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 标记 idle 时总是失败的会话存储
#[derive(Default)]
pub struct FailingIdleStore {
    pub inner: InMemorySessionStore,
}

#[async_trait]
impl SessionStore for FailingIdleStore {
    async fn create(&self, session: Session) -> Result<String> {
        self.inner.create(session).await
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        self.inner.get(session_id).await
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.inner.delete(session_id).await
    }

    async fn delete_all(&self, pattern: &str) -> Result<u64> {
        self.inner.delete_all(pattern).await
    }

    async fn set_active(&self, session_id: &str, active: bool) -> Result<Option<Session>> {
        if !active {
            return Err(HereNowError::store("connection reset by peer"));
        }
        self.inner.set_active(session_id, active).await
    }

    async fn list(&self, pattern: &str) -> Result<Vec<Session>> {
        self.inner.list(pattern).await
    }
}

pub fn users() -> Arc<FakeUserDirectory> {
    Arc::new(
        FakeUserDirectory::default()
            .with_user("42", "Alice", "alice@example.com", "s3cret", "ek_read_session")
            .with_user(
                "1",
                "Root",
                "root@example.com",
                "toor",
                "ek_admin,ek_read_session,ek_delete_session",
            ),
    )
}

pub fn services(store: Arc<dyn SessionStore>, users: Arc<FakeUserDirectory>) -> GatewayServices {
    GatewayServices::new(tokens(), store, users, MessageDispatcher::new(), 86_400)
}

/// 直接签发令牌，绕过登录
pub fn issue_token(session_id: &str, user_id: &str, privileges: &str) -> String {
    let subject = TokenSubject {
        session_id: session_id.to_string(),
        user_id: user_id.to_string(),
        email: format!("{user_id}@example.com"),
        name: user_id.to_string(),
        roles: String::new(),
        privileges: privileges.to_string(),
    };
    tokens().issue(&subject, None).unwrap()
}

/// 标记 idle 时在读取之后、写入之前停在闸门处的会话存储
#[derive(Default)]
pub struct GatedIdleStore {
    pub inner: InMemorySessionStore,
    /// 下线写入到达闸门
    pub reached: Notify,
    /// 放行下线写入
    pub release: Notify,
}

#[async_trait]
impl SessionStore for GatedIdleStore {
    async fn create(&self, session: Session) -> Result<String> {
        self.inner.create(session).await
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        self.inner.get(session_id).await
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.inner.delete(session_id).await
    }

    async fn delete_all(&self, pattern: &str) -> Result<u64> {
        self.inner.delete_all(pattern).await
    }

    async fn set_active(&self, session_id: &str, active: bool) -> Result<Option<Session>> {
        if !active {
            let _current = self.inner.get(session_id).await?;
            self.reached.notify_one();
            self.release.notified().await;
        }
        self.inner.set_active(session_id, active).await
    }

    async fn list(&self, pattern: &str) -> Result<Vec<Session>> {
        self.inner.list(pattern).await
    }
}
