use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话内嵌的用户摘要
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// 会话状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Online,
}

impl SessionStatus {
    pub fn from_active(active: bool) -> Self {
        if active { Self::Online } else { Self::Idle }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Online => "online",
        }
    }
}

/// 客户端信息（登录时由客户端上报）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub device_type: String,
}

/// 会话记录
///
/// 存储形态：`{id, user:{id,name,email}, agent, platform, model, deviceName, deviceType, ip, status, updated}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// 存储时为空，读取时由 key 回填
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user: SessionUser,
    #[serde(flatten)]
    pub client: ClientInfo,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub status: SessionStatus,
    pub updated: DateTime<Utc>,
}

impl Session {
    /// 登录时创建的新会话，状态为 idle
    pub fn new(user: SessionUser, client: ClientInfo, ip: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            user,
            client,
            ip: ip.into(),
            status: SessionStatus::Idle,
            updated: Utc::now(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == SessionStatus::Online
    }

    /// 切换在线状态并刷新更新时间
    pub fn set_active(&mut self, active: bool, now: DateTime<Utc>) {
        self.status = SessionStatus::from_active(active);
        self.updated = now;
    }
}
