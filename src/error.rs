//! HereNow 错误工具模块
//!
//! - 统一对外暴露 `HereNowError` / `ErrorCode`
//! - 为基础设施层提供便捷的错误转换工具（`InfraResultExt`）

use std::fmt;

use thiserror::Error;

/// 基础设施层使用的结果类型（redis / sqlx / serde 等错误统一为 anyhow）
pub type InfraResult<T> = anyhow::Result<T>;

/// 业务层结果类型
pub type Result<T> = std::result::Result<T, HereNowError>;

/// 错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 身份认证失败（缺少/无效/过期 token、密码错误、用户不存在）
    AuthenticationFailed,
    /// 已认证但权限不足
    PermissionDenied,
    /// 资源不存在
    NotFound,
    /// 存储不可用（关系库或 KV 存储无法连接）
    ServiceUnavailable,
    /// 存储操作失败
    StoreError,
    /// 请求格式错误
    InvalidRequest,
    /// 帧格式错误或无法路由
    ProtocolError,
    /// 内部错误
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => "authentication_failed",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::NotFound => "not_found",
            ErrorCode::ServiceUnavailable => "service_unavailable",
            ErrorCode::StoreError => "store_error",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::ProtocolError => "protocol_error",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 统一业务错误
///
/// `Display` 只输出 message，HTTP 层直接把它作为响应体返回
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HereNowError {
    code: ErrorCode,
    message: String,
}

impl HereNowError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationFailed, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreError, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProtocolError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 存储不可用类错误（HTTP 路径映射为 503，后台路径记录后忽略）
    pub fn is_unavailable(&self) -> bool {
        self.code == ErrorCode::ServiceUnavailable
    }
}

/// 将基础设施错误转换为业务错误
pub trait InfraResultExt<T> {
    fn into_herenow(self, code: ErrorCode, message: &str) -> Result<T>;
}

impl<T, E> InfraResultExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn into_herenow(self, code: ErrorCode, message: &str) -> Result<T> {
        self.map_err(|err| {
            let err: anyhow::Error = err.into();
            HereNowError::new(code, format!("{message}: {err:#}"))
        })
    }
}
