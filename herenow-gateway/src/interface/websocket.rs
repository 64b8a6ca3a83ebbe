//! WebSocket 适配
//!
//! 读半部转换为 [`InboundFrame`] 流交给生命周期管理；写半部由独立任务独占，
//! 从连接句柄的通道取帧写出。

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::connection::{ConnectionLifecycle, InboundFrame};
use crate::domain::{ConnectionHandle, OutboundFrame};

pub async fn serve_socket(socket: WebSocket, session_id: String, lifecycle: Arc<ConnectionLifecycle>) {
    let (mut sink, stream) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::new();
    let connection_id = handle.connection_id().to_string();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if let Err(err) = sink.send(WsMessage::Text(text.into())).await {
                        warn!(error = %err, "Error writing message");
                        break;
                    }
                }
                OutboundFrame::Close => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
        let _ = sink.close().await;
    });

    // ping/pong 控制帧由协议层自动应答
    let inbound = stream
        .filter_map(|message| async move {
            match message {
                Ok(WsMessage::Text(text)) => Some(Ok(InboundFrame::Text(text.as_str().to_owned()))),
                Ok(WsMessage::Binary(bytes)) => Some(Ok(InboundFrame::Binary(bytes.to_vec()))),
                Ok(WsMessage::Close(_)) => Some(Ok(InboundFrame::Close)),
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => None,
                Err(err) => Some(Err(err)),
            }
        })
        .boxed();

    let outcome = lifecycle.run(&session_id, inbound, handle).await;
    debug!(session_id = %session_id, connection_id = %connection_id, outcome = ?outcome, "websocket finished");

    // 所有句柄释放后写任务退出
    if let Err(err) = writer.await {
        warn!(error = %err, "websocket writer task failed");
    }
}
