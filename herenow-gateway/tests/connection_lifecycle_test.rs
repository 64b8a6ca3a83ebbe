mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herenow_core::error::Result;
use herenow_core::feature::FeatureHandler;
use herenow_gateway::application::MessageDispatcher;
use herenow_gateway::domain::{
    ClientInfo, ConnectionHandle, ConnectionRegistry, OutboundFrame, Session, SessionStatus, SessionStore,
    SessionUser,
};
use herenow_gateway::infrastructure::session_store::in_memory::InMemorySessionStore;
use herenow_gateway::interface::{CloseReason, ConnectionLifecycle, ConnectionOutcome, InboundFrame};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Inbound = UnboundedReceiverStream<std::result::Result<InboundFrame, String>>;

struct EchoHandler;

#[async_trait]
impl FeatureHandler for EchoHandler {
    fn app_id(&self) -> &str {
        "echo"
    }

    async fn handle(&self, user_id: &str, _kind: &str, _subtype: &str, text: &str) -> Result<String> {
        Ok(format!("{user_id}:{text}"))
    }
}

struct Harness {
    lifecycle: Arc<ConnectionLifecycle>,
    registry: Arc<ConnectionRegistry>,
    users: Arc<common::FakeUserDirectory>,
}

fn harness(store: Arc<dyn SessionStore>) -> Harness {
    let users = common::users();
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = MessageDispatcher::new().with_handler(Arc::new(EchoHandler));
    let lifecycle = Arc::new(ConnectionLifecycle::new(
        common::tokens(),
        store,
        users.clone(),
        registry.clone(),
        Arc::new(dispatcher),
    ));
    Harness {
        lifecycle,
        registry,
        users,
    }
}

async fn seed_session(store: &dyn SessionStore) -> String {
    store
        .create(Session::new(
            SessionUser {
                id: "42".into(),
                name: "Alice".into(),
                email: "alice@example.com".into(),
            },
            ClientInfo::default(),
            "127.0.0.1:4000",
        ))
        .await
        .unwrap()
}

fn inbound() -> (mpsc::UnboundedSender<std::result::Result<InboundFrame, String>>, Inbound) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx))
}

async fn wait_for_registration(registry: &ConnectionRegistry, session_id: &str) {
    for _ in 0..100 {
        if registry.get(session_id).is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("connection for {session_id} never registered");
}

#[tokio::test]
async fn session_goes_online_then_idle() {
    let store = Arc::new(InMemorySessionStore::new());
    let session_id = seed_session(store.as_ref()).await;
    let h = harness(store.clone());

    let (tx, stream) = inbound();
    let (handle, _outbound) = ConnectionHandle::new();
    let lifecycle = h.lifecycle.clone();
    let sid = session_id.clone();
    let task = tokio::spawn(async move { lifecycle.run(&sid, stream, handle).await });

    wait_for_registration(&h.registry, &session_id).await;
    let online = store.get(&session_id).await.unwrap().unwrap();
    assert_eq!(online.status, SessionStatus::Online);
    assert_eq!(h.registry.active_connections(), 1);

    tx.send(Ok(InboundFrame::Close)).unwrap();
    let outcome = task.await.unwrap();
    assert_eq!(outcome, ConnectionOutcome::Closed(CloseReason::ClientClosed));

    let idle = store.get(&session_id).await.unwrap().unwrap();
    assert_eq!(idle.status, SessionStatus::Idle);
    assert!(h.registry.get(&session_id).is_none());
    assert_eq!(h.registry.active_connections(), 0);
    assert_eq!(h.users.touch_count(), 2);
}

#[tokio::test]
async fn registry_empties_after_many_connections() {
    let store = Arc::new(InMemorySessionStore::new());
    let h = harness(store.clone());

    let mut tasks = Vec::new();
    let mut senders = Vec::new();
    for _ in 0..8 {
        let session_id = seed_session(store.as_ref()).await;
        let (tx, stream) = inbound();
        let (handle, _outbound) = ConnectionHandle::new();
        let lifecycle = h.lifecycle.clone();
        senders.push(tx);
        tasks.push(tokio::spawn(async move {
            lifecycle.run(&session_id, stream, handle).await
        }));
    }

    for _ in 0..100 {
        if h.registry.count() == 8 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.registry.count(), 8);

    for (i, tx) in senders.into_iter().enumerate() {
        if i % 2 == 0 {
            drop(tx);
        } else {
            tx.send(Err("connection reset".to_string())).unwrap();
        }
    }
    for task in tasks {
        assert!(matches!(task.await.unwrap(), ConnectionOutcome::Closed(_)));
    }

    assert_eq!(h.registry.count(), 0);
    assert_eq!(h.registry.active_connections(), 0);
    assert!(store.list("*").await.unwrap().iter().all(|s| !s.is_online()));
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let store = Arc::new(InMemorySessionStore::new());
    let session_id = seed_session(store.as_ref()).await;
    let h = harness(store.clone());

    let (tx, stream) = inbound();
    let (handle, mut outbound) = ConnectionHandle::new();
    let lifecycle = h.lifecycle.clone();
    let sid = session_id.clone();
    let task = tokio::spawn(async move { lifecycle.run(&sid, stream, handle).await });

    tx.send(Ok(InboundFrame::Text("{not json".into()))).unwrap();
    tx.send(Ok(InboundFrame::Text(r#"{"appId":"echo","type":"t","text":"hi"}"#.into())))
        .unwrap();

    let reply = outbound.recv().await.unwrap();
    assert_eq!(reply, OutboundFrame::Text("42:hi".into()));
    assert_eq!(h.registry.get(&session_id).unwrap().last_activity, "echo/t/");

    drop(tx);
    assert_eq!(
        task.await.unwrap(),
        ConnectionOutcome::Closed(CloseReason::StreamEnded)
    );
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let store = Arc::new(InMemorySessionStore::new());
    let session_id = seed_session(store.as_ref()).await;
    let h = harness(store.clone());

    let (tx, stream) = inbound();
    let (handle, mut outbound) = ConnectionHandle::new();
    let lifecycle = h.lifecycle.clone();
    let task = tokio::spawn(async move { lifecycle.run(&session_id, stream, handle).await });

    tx.send(Ok(InboundFrame::Binary(br#"{"type":"ping"}"#.to_vec())))
        .unwrap();
    let OutboundFrame::Text(reply) = outbound.recv().await.unwrap() else {
        panic!("expected a text frame");
    };
    let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(value["type"], "pong");
    assert!(value["text"].as_str().unwrap().ends_with('Z'));

    tx.send(Ok(InboundFrame::Close)).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn missing_session_closes_immediately() {
    let store = Arc::new(InMemorySessionStore::new());
    let h = harness(store);

    let (_tx, stream) = inbound();
    let (handle, mut outbound) = ConnectionHandle::new();
    let outcome = h.lifecycle.run("does-not-exist", stream, handle).await;

    assert_eq!(outcome, ConnectionOutcome::SessionNotFound);
    assert_eq!(outbound.recv().await, Some(OutboundFrame::Close));
    assert_eq!(h.registry.count(), 0);
    assert_eq!(h.users.touch_count(), 0);
}

#[tokio::test]
async fn replaced_connection_leaves_session_online() {
    let store = Arc::new(InMemorySessionStore::new());
    let session_id = seed_session(store.as_ref()).await;
    let h = harness(store.clone());

    let (_tx1, stream1) = inbound();
    let (first, mut first_out) = ConnectionHandle::new();
    let lifecycle = h.lifecycle.clone();
    let sid = session_id.clone();
    let first_task = tokio::spawn(async move { lifecycle.run(&sid, stream1, first).await });
    wait_for_registration(&h.registry, &session_id).await;

    let (tx2, stream2) = inbound();
    let (second, _second_out) = ConnectionHandle::new();
    let second_id = second.connection_id().to_string();
    let lifecycle = h.lifecycle.clone();
    let sid = session_id.clone();
    let second_task = tokio::spawn(async move { lifecycle.run(&sid, stream2, second).await });

    assert_eq!(
        first_task.await.unwrap(),
        ConnectionOutcome::Closed(CloseReason::Replaced)
    );
    assert_eq!(first_out.recv().await, Some(OutboundFrame::Close));

    let current = h.registry.get(&session_id).unwrap();
    assert_eq!(current.connection_id, second_id);
    assert!(store.get(&session_id).await.unwrap().unwrap().is_online());

    tx2.send(Ok(InboundFrame::Close)).unwrap();
    second_task.await.unwrap();
    assert!(!store.get(&session_id).await.unwrap().unwrap().is_online());
    assert_eq!(h.registry.count(), 0);
}

#[tokio::test]
async fn reconnect_during_teardown_keeps_session_online() {
    let store = Arc::new(common::GatedIdleStore::default());
    let session_id = seed_session(store.as_ref()).await;
    let h = harness(store.clone());

    let (tx1, stream1) = inbound();
    let (first, _first_out) = ConnectionHandle::new();
    let lifecycle = h.lifecycle.clone();
    let sid = session_id.clone();
    let first_task = tokio::spawn(async move { lifecycle.run(&sid, stream1, first).await });
    wait_for_registration(&h.registry, &session_id).await;

    // 旧连接断开，idle 写入停在闸门处
    drop(tx1);
    store.reached.notified().await;
    assert_eq!(h.registry.count(), 0);

    let (tx2, stream2) = inbound();
    let (second, _second_out) = ConnectionHandle::new();
    let second_id = second.connection_id().to_string();
    let lifecycle = h.lifecycle.clone();
    let sid = session_id.clone();
    let second_task = tokio::spawn(async move { lifecycle.run(&sid, stream2, second).await });

    // 新连接等待旧连接下线完成
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.registry.count(), 0);

    store.release.notify_one();
    assert_eq!(
        first_task.await.unwrap(),
        ConnectionOutcome::Closed(CloseReason::StreamEnded)
    );

    wait_for_registration(&h.registry, &session_id).await;
    assert_eq!(h.registry.get(&session_id).unwrap().connection_id, second_id);
    let session = store.get(&session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Online);

    tx2.send(Ok(InboundFrame::Close)).unwrap();
    let teardown = tokio::spawn(async move { second_task.await.unwrap() });
    store.reached.notified().await;
    store.release.notify_one();
    assert_eq!(
        teardown.await.unwrap(),
        ConnectionOutcome::Closed(CloseReason::ClientClosed)
    );
    assert_eq!(
        store.get(&session_id).await.unwrap().unwrap().status,
        SessionStatus::Idle
    );
}

#[tokio::test]
async fn stale_frames_do_not_touch_replacement() {
    let store = Arc::new(InMemorySessionStore::new());
    let session_id = seed_session(store.as_ref()).await;
    let h = harness(store.clone());

    let (_tx1, stream1) = inbound();
    let (first, _first_out) = ConnectionHandle::new();
    let first_id = first.connection_id().to_string();
    let lifecycle = h.lifecycle.clone();
    let sid = session_id.clone();
    let first_task = tokio::spawn(async move { lifecycle.run(&sid, stream1, first).await });
    wait_for_registration(&h.registry, &session_id).await;

    let (tx2, stream2) = inbound();
    let (second, _second_out) = ConnectionHandle::new();
    let lifecycle = h.lifecycle.clone();
    let sid = session_id.clone();
    let second_task = tokio::spawn(async move { lifecycle.run(&sid, stream2, second).await });
    first_task.await.unwrap();

    h.registry.touch(&session_id, &first_id, "echo/late/");
    assert_eq!(h.registry.get(&session_id).unwrap().last_activity, "");

    tx2.send(Ok(InboundFrame::Close)).unwrap();
    second_task.await.unwrap();
}

#[tokio::test]
async fn teardown_store_errors_are_swallowed() {
    let store = Arc::new(common::FailingIdleStore::default());
    let session_id = seed_session(store.as_ref()).await;
    let h = harness(store.clone());
    h.users.set_unavailable(true);

    let (tx, stream) = inbound();
    let (handle, _outbound) = ConnectionHandle::new();
    tx.send(Ok(InboundFrame::Close)).unwrap();
    let outcome = h.lifecycle.run(&session_id, stream, handle).await;

    assert_eq!(outcome, ConnectionOutcome::Closed(CloseReason::ClientClosed));
    assert_eq!(h.registry.count(), 0);
}

#[test]
fn authorize_requires_token() {
    let h = harness(Arc::new(InMemorySessionStore::new()));

    let err = h.lifecycle.authorize(None).unwrap_err();
    assert_eq!(err.message(), "Missing token");

    let token = common::issue_token("s-9", "42", "");
    assert_eq!(h.lifecycle.authorize(Some(&token)).unwrap(), "s-9");
    assert!(h.lifecycle.authorize(Some("garbage")).is_err());
}
