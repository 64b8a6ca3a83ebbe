use serde::{Deserialize, Serialize};

/// 连接上收发的消息信封
///
/// 字段名兼容 `appId` 与 `AppId` 两种写法
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    #[serde(rename = "appId", alias = "AppId", alias = "appid")]
    pub app_id: String,
    #[serde(rename = "type", alias = "Type")]
    pub kind: String,
    #[serde(alias = "Subtype")]
    pub subtype: String,
    #[serde(alias = "Token")]
    pub token: String,
    #[serde(alias = "Text")]
    pub text: String,
}

impl Message {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// `ping` 的应答
    pub fn pong(timestamp: impl Into<String>) -> Self {
        Self {
            kind: "pong".to_string(),
            text: timestamp.into(),
            ..Self::default()
        }
    }

    pub fn is_ping(&self) -> bool {
        self.kind == "ping"
    }

    /// 活动描述，用于连接表的最近活动字段
    pub fn activity(&self) -> String {
        format!("{}/{}/{}", self.app_id, self.kind, self.subtype)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
