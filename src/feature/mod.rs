//! 功能处理器契约
//!
//! 每个业务功能以 app id 注册到网关的消息分发器。分发器只传入由会话得出的用户 ID，
//! 不信任客户端消息中的任何身份字段。

use async_trait::async_trait;

use crate::error::Result;

/// 功能处理器
#[async_trait]
pub trait FeatureHandler: Send + Sync {
    /// 处理器负责的 app id
    fn app_id(&self) -> &str;

    /// 处理一条消息，返回需要回写到连接上的 JSON 文本
    async fn handle(&self, user_id: &str, kind: &str, subtype: &str, text: &str) -> Result<String>;
}
