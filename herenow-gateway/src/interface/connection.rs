//! 连接生命周期
//!
//! `Unauthenticated → Upgrading → Active → Closing → Closed`
//!
//! - 升级前校验令牌，失败直接拒绝，不进入任何状态
//! - 进入 Active 时把会话标记为 online；会话不存在时立即结束，不进入读循环
//! - 读循环逐帧串行处理，单帧的解析或处理错误不会终止连接
//! - 读循环以任何方式退出后依次执行：移出连接表、标记会话 idle、更新最近访问时间
//! - 同一会话的上线与下线互斥执行

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use herenow_core::auth::TokenService;
use herenow_core::error::{HereNowError, Result};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::application::{DispatchOutcome, MessageDispatcher};
use crate::domain::{ConnectionHandle, ConnectionRegistry, Message, SessionStore, UserDirectory};

/// 无法解析的帧在连接表中记录的活动描述
const MALFORMED_ACTIVITY: &str = "malformed";

const STATUS_LOCK_STRIPES: usize = 64;

/// 按会话 ID 分段的状态锁
///
/// 上线（标记 online + 登记）与下线（移出连接表 + 标记 idle）在同一会话上互斥，
/// 旧连接的 idle 写入不会覆盖新连接的 online 写入。
struct SessionStatusLocks {
    stripes: Vec<Mutex<()>>,
}

impl SessionStatusLocks {
    fn new() -> Self {
        Self {
            stripes: (0..STATUS_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn lock(&self, session_id: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        session_id.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.stripes.len();
        self.stripes[idx].lock().await
    }
}

/// 传输层读到的帧
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Upgrading,
    Active,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Upgrading => "upgrading",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// 读循环退出原因
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// 客户端发送关闭帧
    ClientClosed,
    /// 流结束
    StreamEnded,
    /// 读错误
    ReadError(String),
    /// 同一会话的新连接替换了本连接
    Replaced,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// 会话不存在，未进入读循环
    SessionNotFound,
    /// 会话存储不可用，未进入读循环
    Aborted(String),
    Closed(CloseReason),
}

pub struct ConnectionLifecycle {
    tokens: Arc<TokenService>,
    session_store: Arc<dyn SessionStore>,
    users: Arc<dyn UserDirectory>,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<MessageDispatcher>,
    status_locks: SessionStatusLocks,
}

impl ConnectionLifecycle {
    pub fn new(
        tokens: Arc<TokenService>,
        session_store: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        registry: Arc<ConnectionRegistry>,
        dispatcher: Arc<MessageDispatcher>,
    ) -> Self {
        Self {
            tokens,
            session_store,
            users,
            registry,
            dispatcher,
            status_locks: SessionStatusLocks::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 升级前的令牌校验，返回会话 ID
    pub fn authorize(&self, token: Option<&str>) -> Result<String> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HereNowError::unauthorized("Missing token"))?;

        self.tokens.verify_session(token).map_err(|err| {
            warn!(error = %err, state = %ConnectionState::Unauthenticated, "Can't decode token");
            HereNowError::from(err)
        })
    }

    /// 运行一条已升级的连接，直到读循环退出并完成清理
    pub async fn run<S, E>(
        &self,
        session_id: &str,
        mut inbound: S,
        handle: ConnectionHandle,
    ) -> ConnectionOutcome
    where
        S: Stream<Item = std::result::Result<InboundFrame, E>> + Unpin + Send,
        E: fmt::Display,
    {
        debug!(session_id = %session_id, state = %ConnectionState::Upgrading, "connection upgraded");

        let status_guard = self.status_locks.lock(session_id).await;
        let session = match self.session_store.set_active(session_id, true).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!(session_id = %session_id, "Session not found in connection handler");
                handle.close();
                return ConnectionOutcome::SessionNotFound;
            }
            Err(err) => {
                error!(session_id = %session_id, error = %err, "failed to mark session online");
                handle.close();
                return ConnectionOutcome::Aborted(err.to_string());
            }
        };
        let user = session.user;

        if let Some(previous) = self.registry.add(handle.clone(), session_id, user.clone()) {
            warn!(
                session_id = %session_id,
                previous = %previous.connection_id(),
                "duplicate connection for session, closing previous one"
            );
            previous.close();
        }
        drop(status_guard);
        let active = self.registry.track_active();
        self.touch_last_access(&user.id).await;

        info!(name = %user.name, session_id = %session_id, state = %ConnectionState::Active, "connected");

        let reason = loop {
            tokio::select! {
                biased;
                _ = handle.closed() => break CloseReason::Replaced,
                frame = inbound.next() => match frame {
                    None => break CloseReason::StreamEnded,
                    Some(Err(err)) => {
                        debug!(session_id = %session_id, error = %err, "Error reading message");
                        break CloseReason::ReadError(err.to_string());
                    }
                    Some(Ok(InboundFrame::Close)) => break CloseReason::ClientClosed,
                    Some(Ok(InboundFrame::Text(text))) => {
                        self.handle_frame(session_id, &user.id, &text, &handle).await;
                    }
                    Some(Ok(InboundFrame::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.handle_frame(session_id, &user.id, &text, &handle).await,
                        Err(err) => {
                            warn!(session_id = %session_id, error = %err, "binary frame is not utf-8");
                            self.registry.touch(session_id, handle.connection_id(), MALFORMED_ACTIVITY);
                        }
                    },
                },
            }
        };

        debug!(session_id = %session_id, state = %ConnectionState::Closing, reason = ?reason, "leaving read loop");

        let status_guard = self.status_locks.lock(session_id).await;
        let removed = self.registry.remove(session_id, handle.connection_id());
        drop(active);

        info!(name = %user.name, session_id = %session_id, "disconnected");

        if removed {
            if let Err(err) = self.session_store.set_active(session_id, false).await {
                error!(session_id = %session_id, error = %err, "failed to mark session idle");
            }
        } else {
            debug!(session_id = %session_id, "connection was replaced, session stays online");
        }
        drop(status_guard);
        self.touch_last_access(&user.id).await;

        debug!(session_id = %session_id, state = %ConnectionState::Closed, "connection closed");
        ConnectionOutcome::Closed(reason)
    }

    async fn handle_frame(&self, session_id: &str, user_id: &str, text: &str, handle: &ConnectionHandle) {
        let message = match Message::parse(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Error unmarshalling message");
                self.registry.touch(session_id, handle.connection_id(), MALFORMED_ACTIVITY);
                return;
            }
        };

        self.registry
            .touch(session_id, handle.connection_id(), &message.activity());

        match self.dispatcher.dispatch(user_id, &message).await {
            DispatchOutcome::Reply(reply) => {
                if !handle.send_text(reply) {
                    warn!(session_id = %session_id, "Error writing message: writer closed");
                }
            }
            DispatchOutcome::Unrouted | DispatchOutcome::HandlerFailed(_) => {}
        }
    }

    /// 尽力更新最近访问时间，失败只记录日志
    async fn touch_last_access(&self, user_id: &str) {
        if let Err(err) = self.users.touch_last_access(user_id).await {
            if err.is_unavailable() {
                warn!(user_id = %user_id, "Database unavailable, last access not updated");
            } else {
                error!(user_id = %user_id, error = %err, "failed to update last access");
            }
        }
    }
}
