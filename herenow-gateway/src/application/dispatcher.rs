//! 消息分发器
//!
//! 按 `appId` 把入站消息交给已注册的功能处理器；没有处理器认领时，
//! `type == "ping"` 由分发器直接应答 `pong`，其余消息记录后丢弃。

use std::collections::HashMap;
use std::sync::Arc;

use herenow_core::error::HereNowError;
use herenow_core::feature::FeatureHandler;
use herenow_core::utils::now_rfc3339;
use tracing::{debug, info, warn};

use crate::domain::Message;

/// 单条消息的处理结果
#[derive(Debug)]
pub enum DispatchOutcome {
    /// 需要回写到连接上的文本
    Reply(String),
    /// 无法路由，已丢弃
    Unrouted,
    /// 处理器返回错误，不回复
    HandlerFailed(HereNowError),
}

#[derive(Default)]
pub struct MessageDispatcher {
    handlers: HashMap<String, Arc<dyn FeatureHandler>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: Arc<dyn FeatureHandler>) -> Self {
        self.register(handler);
        self
    }

    /// 注册处理器，同一 app id 后注册的覆盖先注册的
    pub fn register(&mut self, handler: Arc<dyn FeatureHandler>) {
        let app_id = handler.app_id().to_string();
        if self.handlers.insert(app_id.clone(), handler).is_some() {
            warn!(app_id = %app_id, "feature handler replaced");
        } else {
            info!(app_id = %app_id, "feature handler registered");
        }
    }

    pub fn app_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 处理一条消息，`user_id` 必须来自会话
    pub async fn dispatch(&self, user_id: &str, message: &Message) -> DispatchOutcome {
        if let Some(handler) = self.handlers.get(&message.app_id) {
            return match handler
                .handle(user_id, &message.kind, &message.subtype, &message.text)
                .await
            {
                Ok(reply) => DispatchOutcome::Reply(reply),
                Err(err) => {
                    warn!(
                        app_id = %message.app_id,
                        kind = %message.kind,
                        subtype = %message.subtype,
                        error = %err,
                        "feature handler failed"
                    );
                    DispatchOutcome::HandlerFailed(err)
                }
            };
        }

        if message.is_ping() {
            return match Message::pong(now_rfc3339()).to_json() {
                Ok(json) => DispatchOutcome::Reply(json),
                Err(err) => DispatchOutcome::HandlerFailed(HereNowError::internal(err.to_string())),
            };
        }

        debug!(
            app_id = %message.app_id,
            kind = %message.kind,
            text = %message.text,
            "Unhandled message"
        );
        DispatchOutcome::Unrouted
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use herenow_core::error::Result;

    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl FeatureHandler for EchoHandler {
        fn app_id(&self) -> &str {
            "echo"
        }

        async fn handle(&self, user_id: &str, kind: &str, subtype: &str, text: &str) -> Result<String> {
            if kind == "fail" {
                return Err(HereNowError::bad_request("unsupported"));
            }
            Ok(format!("{user_id}:{kind}:{subtype}:{text}"))
        }
    }

    fn message(app_id: &str, kind: &str) -> Message {
        Message {
            app_id: app_id.into(),
            kind: kind.into(),
            subtype: "sub".into(),
            token: String::new(),
            text: "hi".into(),
        }
    }

    fn dispatcher() -> MessageDispatcher {
        MessageDispatcher::new().with_handler(Arc::new(EchoHandler))
    }

    #[tokio::test]
    async fn routes_by_app_id() {
        match dispatcher().dispatch("u1", &message("echo", "map")).await {
            DispatchOutcome::Reply(reply) => assert_eq!(reply, "u1:map:sub:hi"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_fallback_replies_pong() {
        match dispatcher().dispatch("u1", &message("", "ping")).await {
            DispatchOutcome::Reply(reply) => {
                let pong = Message::parse(&reply).unwrap();
                assert_eq!(pong.kind, "pong");
                assert!(pong.text.ends_with('Z'));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn feature_handler_wins_over_ping() {
        match dispatcher().dispatch("u1", &message("echo", "ping")).await {
            DispatchOutcome::Reply(reply) => assert_eq!(reply, "u1:ping:sub:hi"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_routes_are_dropped() {
        assert!(matches!(
            dispatcher().dispatch("u1", &message("unknown", "map")).await,
            DispatchOutcome::Unrouted
        ));
    }

    #[tokio::test]
    async fn handler_errors_produce_no_reply() {
        assert!(matches!(
            dispatcher().dispatch("u1", &message("echo", "fail")).await,
            DispatchOutcome::HandlerFailed(_)
        ));
    }
}
