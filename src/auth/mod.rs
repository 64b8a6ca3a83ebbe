//! # 令牌签发与校验
//!
//! 访问令牌是 HMAC 签名的 JWT，携带会话 ID 与用户身份。
//!
//! - 只接受 HMAC 系列算法（HS256 / HS384 / HS512），其他算法一律拒绝
//! - `exp` 可选：不存在时令牌永不过期，存在时必须晚于校验时刻
//! - `exp` 类型不是数字时视为不存在
//! - `sessionId` 必须是字符串

pub mod privilege;

pub use privilege::{ADMIN_PRIVILEGE, DELETE_SESSION, READ_SESSION, has_privilege};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::HereNowError;

/// 令牌校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("missing session id in token")]
    MissingSessionId,
    #[error("token expired")]
    Expired,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<TokenError> for HereNowError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(_) => HereNowError::internal(err.to_string()),
            _ => HereNowError::unauthorized(err.to_string()),
        }
    }
}

/// 令牌声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(
        rename = "sessionId",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<String>,
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub roles: String,
    #[serde(default)]
    pub privileges: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub iat: i64,
    #[serde(
        default,
        deserialize_with = "lenient_exp",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,
}

impl AccessClaims {
    /// 用户 ID，优先 `userId`，其次 `sub`
    pub fn user_id(&self) -> &str {
        if self.user_id.is_empty() {
            &self.sub
        } else {
            &self.user_id
        }
    }
}

/// 签发令牌所需的身份信息
#[derive(Debug, Clone, Default)]
pub struct TokenSubject {
    /// 空字符串表示不绑定会话（nosession 模式）
    pub session_id: String,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub roles: String,
    pub privileges: String,
}

/// 令牌服务
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl TokenService {
    pub fn new(secret: impl AsRef<[u8]>, issuer: impl Into<String>) -> Self {
        let secret = secret.as_ref();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // 过期时间由 verify_at 自行判断（exp 可选且容忍非数字类型）
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer: issuer.into(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> crate::error::Result<Self> {
        let secret = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HereNowError::internal("jwt secret is not configured"))?;
        Ok(Self::new(secret, config.issuer()))
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// 签发令牌，`ttl` 为 None 时不写入 `exp`
    pub fn issue(&self, subject: &TokenSubject, ttl: Option<Duration>) -> Result<String, TokenError> {
        self.issue_at(subject, Utc::now(), ttl)
    }

    pub fn issue_at(
        &self,
        subject: &TokenSubject,
        now: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Result<String, TokenError> {
        let iat = now.timestamp();
        let claims = AccessClaims {
            session_id: Some(subject.session_id.clone()),
            user_id: subject.user_id.clone(),
            email: subject.email.clone(),
            name: subject.name.clone(),
            roles: subject.roles.clone(),
            privileges: subject.privileges.clone(),
            iss: self.issuer.clone(),
            sub: subject.user_id.clone(),
            iat,
            exp: ttl.map(|ttl| iat + ttl.num_seconds()),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// 校验签名与算法并解析声明，不检查过期
    pub fn decode(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                debug!(error = %err, "token decode failed");
                TokenError::Invalid
            })
    }

    /// 完整校验，返回声明
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        let claims = self.decode(token)?;
        if claims.session_id.is_none() {
            return Err(TokenError::MissingSessionId);
        }
        if let Some(exp) = claims.exp {
            if now.timestamp() > exp {
                return Err(TokenError::Expired);
            }
        }
        Ok(claims)
    }

    /// 校验令牌并返回会话 ID
    pub fn verify_session(&self, token: &str) -> Result<String, TokenError> {
        self.verify(token)
            .map(|claims| claims.session_id.unwrap_or_default())
    }
}

/// 非字符串的值按缺失处理
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

/// 非数字的 exp 按缺失处理
fn lenient_exp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }))
}
