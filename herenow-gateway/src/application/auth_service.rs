//! 登录、登出与请求鉴权

use std::sync::Arc;

use chrono::Duration;
use herenow_core::auth::{AccessClaims, TokenError, TokenService, TokenSubject, has_privilege};
use herenow_core::error::{HereNowError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::domain::{ClientInfo, Session, SessionStore, SessionUser, UserDirectory};

/// 访客的占位用户 ID
pub const GUEST_USER_ID: &str = "guest";

/// 登录请求体
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginCredentials {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub client: ClientInfo,
}

#[derive(Clone, Debug, Default)]
pub struct LoginRequest {
    pub credentials: LoginCredentials,
    /// 访客登录，跳过密码校验，令牌 24 小时后过期
    pub guest: bool,
    /// 不创建会话（命令行等非交互调用方）
    pub no_session: bool,
    pub remote_addr: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub name: String,
    pub id: String,
}

pub struct AuthService {
    session_store: Arc<dyn SessionStore>,
    users: Arc<dyn UserDirectory>,
    tokens: Arc<TokenService>,
    guest_ttl: Duration,
}

impl AuthService {
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        tokens: Arc<TokenService>,
        guest_ttl_seconds: u64,
    ) -> Self {
        Self {
            session_store,
            users,
            tokens,
            guest_ttl: i64::try_from(guest_ttl_seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or_else(|| Duration::hours(24)),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let LoginRequest {
            credentials,
            guest,
            no_session,
            remote_addr,
        } = request;

        let (user_id, name, roles, privileges) = if guest {
            (
                GUEST_USER_ID.to_string(),
                credentials.name.clone(),
                String::new(),
                String::new(),
            )
        } else {
            let record = self
                .users
                .verify_credentials(&credentials.email, &credentials.password)
                .await?;
            match record {
                None => {
                    warn!(email = %credentials.email, "login rejected: user not found");
                    return Err(HereNowError::unauthorized("User not found"));
                }
                Some(record) if !record.password_match => {
                    warn!(email = %credentials.email, "login rejected: wrong password");
                    return Err(HereNowError::unauthorized("Wrong password"));
                }
                Some(record) => (record.id, record.name, record.roles, record.privileges),
            }
        };

        let user = SessionUser {
            id: user_id.clone(),
            name: name.clone(),
            email: credentials.email.clone(),
        };

        let session_id = if no_session {
            String::new()
        } else {
            let session = Session::new(user.clone(), credentials.client, remote_addr);
            self.session_store.create(session).await.map_err(|err| {
                error!(error = %err, user_id = %user_id, "failed to create session");
                HereNowError::internal("Error creating session")
            })?
        };

        let subject = TokenSubject {
            session_id,
            user_id: user_id.clone(),
            email: credentials.email,
            name: name.clone(),
            roles,
            privileges,
        };
        let ttl = guest.then_some(self.guest_ttl);
        let token = self.tokens.issue(&subject, ttl).map_err(|err| {
            error!(error = %err, "failed to sign token");
            HereNowError::internal("Error generating token")
        })?;

        if guest {
            info!(name = %user.name, "Guest entered");
        } else {
            info!(name = %user.name, user_id = %user.id, "User successfully authenticated");
        }

        Ok(LoginResponse {
            token,
            name,
            id: user_id,
        })
    }

    /// 删除令牌引用的会话
    ///
    /// 只校验签名不校验过期，过期的访客令牌也能登出
    pub async fn logout(&self, token: &str) -> Result<()> {
        let claims = self.tokens.decode(token).inspect_err(|err| {
            warn!(error = %err, "logout with undecodable token");
        })?;
        let session_id = claims.session_id.ok_or_else(|| {
            warn!("claim 'sessionId' not found or not a string");
            HereNowError::from(TokenError::MissingSessionId)
        })?;

        if session_id.is_empty() {
            return Ok(());
        }

        info!(session_id = %session_id, "Deleting session");
        match self.session_store.delete(&session_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.code() == herenow_core::ErrorCode::NotFound => {
                debug!(session_id = %session_id, "session already gone");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// 校验 `Authorization` 头，返回令牌声明
    pub fn authorize(&self, header: Option<&str>) -> Result<AccessClaims> {
        let raw = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| HereNowError::unauthorized("missing Authorization header"))?;
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();

        let claims = self.tokens.verify(token).map_err(|err| match err {
            TokenError::Expired => HereNowError::from(err),
            _ => HereNowError::unauthorized("invalid token"),
        })?;

        if claims.user_id().is_empty() {
            return Err(HereNowError::unauthorized("missing user id in token"));
        }
        Ok(claims)
    }

    /// 权限检查，必须在身份校验之后调用
    pub fn require_privilege(claims: &AccessClaims, privilege: &str) -> Result<()> {
        if has_privilege(&claims.privileges, privilege) {
            Ok(())
        } else {
            Err(HereNowError::forbidden("missing required privileges"))
        }
    }
}
