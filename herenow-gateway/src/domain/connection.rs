//! 连接表
//!
//! 进程内记录当前打开的长连接，按会话 ID 索引。所有操作共用一把互斥锁；
//! 活跃连接计数使用独立的原子变量，读取时不需要加锁。

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use super::SessionUser;

/// 发往客户端的帧
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// 连接句柄
///
/// 持有发送通道与服务端关闭信号，传输层的写半部由写任务独占
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    connection_id: String,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    closed: Arc<Notify>,
}

impl ConnectionHandle {
    /// 创建句柄，返回写任务消费的接收端
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            connection_id: Uuid::new_v4().to_string(),
            outbound: tx,
            closed: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// 发送文本帧，写任务已退出时返回 false
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.outbound.send(OutboundFrame::Text(text.into())).is_ok()
    }

    /// 服务端主动关闭连接
    pub fn close(&self) {
        let _ = self.outbound.send(OutboundFrame::Close);
        self.closed.notify_one();
    }

    /// 等待服务端关闭信号
    pub async fn closed(&self) {
        self.closed.notified().await;
    }
}

struct ConnectionEntry {
    handle: ConnectionHandle,
    session_id: String,
    user: SessionUser,
    created: DateTime<Utc>,
    last_activity: String,
    last_activity_time: Option<DateTime<Utc>>,
}

impl ConnectionEntry {
    fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            connection_id: self.handle.connection_id.clone(),
            session_id: self.session_id.clone(),
            user_id: self.user.id.clone(),
            name: self.user.name.clone(),
            email: self.user.email.clone(),
            created: self.created,
            last_activity: self.last_activity.clone(),
            last_activity_time: self.last_activity_time,
        }
    }
}

/// 连接快照
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connection_id: String,
    pub session_id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub created: DateTime<Utc>,
    pub last_activity: String,
    pub last_activity_time: Option<DateTime<Utc>>,
}

/// 连接表
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<Vec<ConnectionEntry>>,
    active: Arc<AtomicI64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ConnectionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记连接
    ///
    /// 同一会话已有连接时后来者生效：旧条目被移出并返回，由调用方关闭
    pub fn add(
        &self,
        handle: ConnectionHandle,
        session_id: &str,
        user: SessionUser,
    ) -> Option<ConnectionHandle> {
        let mut entries = self.lock();
        let evicted = entries
            .iter()
            .position(|e| e.session_id == session_id)
            .map(|idx| entries.remove(idx).handle);
        entries.push(ConnectionEntry {
            handle,
            session_id: session_id.to_string(),
            user,
            created: Utc::now(),
            last_activity: String::new(),
            last_activity_time: None,
        });
        evicted
    }

    /// 移除指定连接，未找到时静默返回 false
    pub fn remove(&self, session_id: &str, connection_id: &str) -> bool {
        let mut entries = self.lock();
        match entries
            .iter()
            .position(|e| e.session_id == session_id && e.handle.connection_id == connection_id)
        {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// 记录最近活动，只更新指定连接的条目
    pub fn touch(&self, session_id: &str, connection_id: &str, activity: &str) {
        let mut entries = self.lock();
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.session_id == session_id && e.handle.connection_id == connection_id)
        {
            entry.last_activity = activity.to_string();
            entry.last_activity_time = Some(Utc::now());
        }
    }

    pub fn get(&self, session_id: &str) -> Option<ConnectionInfo> {
        self.lock()
            .iter()
            .find(|e| e.session_id == session_id)
            .map(ConnectionEntry::info)
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// 返回副本，调用方遍历时不受并发修改影响
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        self.lock().iter().map(ConnectionEntry::info).collect()
    }

    /// 向会话对应的连接推送文本帧
    pub fn send_to(&self, session_id: &str, text: &str) -> bool {
        let handle = self
            .lock()
            .iter()
            .find(|e| e.session_id == session_id)
            .map(|e| e.handle.clone());
        handle.map(|h| h.send_text(text)).unwrap_or(false)
    }

    /// 活跃连接数（读循环运行中的连接）
    pub fn active_connections(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }

    /// 计数加一，guard 释放时减一
    pub fn track_active(&self) -> ActiveConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveConnectionGuard {
            counter: Arc::clone(&self.active),
        }
    }
}

/// 活跃连接计数守卫
pub struct ActiveConnectionGuard {
    counter: Arc<AtomicI64>,
}

impl Drop for ActiveConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> SessionUser {
        SessionUser {
            id: "1".into(),
            name: "Alice".into(),
            email: email.into(),
        }
    }

    #[test]
    fn add_and_remove() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = ConnectionHandle::new();
        let id = handle.connection_id().to_string();

        assert!(registry.add(handle, "s1", user("a@b.com")).is_none());
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get("s1").unwrap().email, "a@b.com");

        assert!(!registry.remove("s1", "other-connection"));
        assert!(registry.remove("s1", &id));
        assert!(!registry.remove("s1", &id));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn second_connection_evicts_first() {
        let registry = ConnectionRegistry::new();
        let (first, mut first_rx) = ConnectionHandle::new();
        let (second, _second_rx) = ConnectionHandle::new();
        let first_id = first.connection_id().to_string();
        let second_id = second.connection_id().to_string();

        registry.add(first, "s1", user("a@b.com"));
        let evicted = registry.add(second, "s1", user("a@b.com")).unwrap();
        assert_eq!(evicted.connection_id(), first_id);
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get("s1").unwrap().connection_id, second_id);

        evicted.close();
        assert_eq!(first_rx.recv().await, Some(OutboundFrame::Close));
        evicted.closed().await;

        // 旧连接的清理不会移除新连接
        assert!(!registry.remove("s1", &first_id));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn touch_from_replaced_connection_is_ignored() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = ConnectionHandle::new();
        let first_id = first.connection_id().to_string();
        registry.add(first, "s1", user("a@b.com"));
        let (second, _rx2) = ConnectionHandle::new();
        let second_id = second.connection_id().to_string();
        registry.add(second, "s1", user("a@b.com"));

        registry.touch("s1", &first_id, "here-now/map/byPosition");
        let info = registry.get("s1").unwrap();
        assert_eq!(info.last_activity, "");
        assert!(info.last_activity_time.is_none());

        registry.touch("s1", &second_id, "echo/t/");
        assert_eq!(registry.get("s1").unwrap().last_activity, "echo/t/");
    }

    #[test]
    fn snapshot_is_a_copy() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = ConnectionHandle::new();
        let id = handle.connection_id().to_string();
        registry.add(handle, "s1", user("a@b.com"));

        let snapshot = registry.snapshot();
        registry.remove("s1", &id);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.snapshot().len(), 0);
    }

    #[tokio::test]
    async fn touch_and_send() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = ConnectionHandle::new();
        let id = handle.connection_id().to_string();
        registry.add(handle, "s1", user("a@b.com"));

        registry.touch("s1", &id, "here-now/map/byPosition");
        let info = registry.get("s1").unwrap();
        assert_eq!(info.last_activity, "here-now/map/byPosition");
        assert!(info.last_activity_time.is_some());

        assert!(registry.send_to("s1", "hello"));
        assert!(!registry.send_to("missing", "hello"));
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("hello".into())));
    }

    #[test]
    fn active_guard_counts() {
        let registry = ConnectionRegistry::new();
        let a = registry.track_active();
        let b = registry.track_active();
        assert_eq!(registry.active_connections(), 2);
        drop(a);
        drop(b);
        assert_eq!(registry.active_connections(), 0);
    }
}
