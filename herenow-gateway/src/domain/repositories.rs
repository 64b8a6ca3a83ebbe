use async_trait::async_trait;
use herenow_core::error::Result;

use super::Session;

/// 会话存储
///
/// `pattern` 为 glob 风格（`*` 通配），相对于存储自身的 key 命名空间
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 写入新会话，返回生成的会话 ID
    async fn create(&self, session: Session) -> Result<String>;
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;
    /// 删除会话，key 不存在时返回 `NotFound`
    async fn delete(&self, session_id: &str) -> Result<()>;
    /// 按模式批量删除，返回删除数量
    async fn delete_all(&self, pattern: &str) -> Result<u64>;
    /// 更新在线状态并保留原有过期策略；会话不存在时返回 None
    async fn set_active(&self, session_id: &str, active: bool) -> Result<Option<Session>>;
    async fn list(&self, pattern: &str) -> Result<Vec<Session>>;
}

/// 用户目录中的用户记录
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    /// 密码比对由存储完成
    pub password_match: bool,
    pub roles: String,
    pub privileges: String,
}

/// 用户目录（关系库）
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 按邮箱（大小写不敏感）查找启用的用户并比对密码
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<UserRecord>>;
    /// 更新用户最近访问时间
    async fn touch_last_access(&self, user_id: &str) -> Result<()>;
}
