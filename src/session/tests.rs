//! End-to-end session tests over localhost sockets.

use super::*;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Dispatcher that forwards payloads into a channel and announces
/// itself with a recognizable marker.
struct TestDispatcher {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl MessageDispatcher for TestDispatcher {
    fn handle_message(&self, msg: NetworkMessage) {
        let _ = self.tx.send(msg.payload().to_vec());
    }

    fn create_database_store(&self, ctx: &RouterContext) -> NetworkMessage {
        let mut payload = b"dbstore:".to_vec();
        payload.extend_from_slice(&ctx.ident_hash().as_bytes()[..8]);
        NetworkMessage::from_payload(&payload)
    }
}

struct Loopback {
    client: Arc<Session>,
    client_stream: TcpStream,
    client_registry: Arc<SessionRegistry>,
    server_registry: Arc<SessionRegistry>,
    client_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    server_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    server_ctx: Arc<RouterContext>,
    server_task: JoinHandle<()>,
}

/// Stand up a responder on localhost and a connected initiator
/// session. The initiator's `run` is left to the test so it can seed
/// state beforehand.
async fn loopback() -> Loopback {
    let client_ctx = Arc::new(RouterContext::generate());
    let server_ctx = Arc::new(RouterContext::generate());
    let client_registry = SessionRegistry::new();
    let server_registry = SessionRegistry::new();
    let (server_tx, server_rx) = mpsc::unbounded_channel();
    let (client_tx, client_rx) = mpsc::unbounded_channel();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_session = Session::new(
        Role::Responder,
        server_ctx.clone(),
        RouterInfo::unknown(),
        server_registry.clone(),
        Arc::new(TestDispatcher { tx: server_tx }),
        Duration::from_secs(10),
    );
    let server_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        server_session.run(stream).await;
    });

    let client_stream = TcpStream::connect(addr).await.unwrap();
    let client = Session::new(
        Role::Initiator,
        client_ctx,
        RouterInfo::new(server_ctx.identity().clone()),
        client_registry.clone(),
        Arc::new(TestDispatcher { tx: client_tx }),
        Duration::from_secs(10),
    );

    Loopback {
        client,
        client_stream,
        client_registry,
        server_registry,
        client_rx,
        server_rx,
        server_ctx,
        server_task,
    }
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

#[tokio::test]
async fn test_loopback_establish_and_exchange() {
    let mut lo = loopback().await;
    tokio::spawn(lo.client.clone().run(lo.client_stream));

    // Both sides announce themselves as their first inner message.
    let to_server = recv(&mut lo.server_rx).await;
    assert!(to_server.starts_with(b"dbstore:"));
    let to_client = recv(&mut lo.client_rx).await;
    assert!(to_client.starts_with(b"dbstore:"));

    assert!(lo.client.is_established());
    assert_eq!(lo.client_registry.len(), 1);
    assert_eq!(lo.server_registry.len(), 1);
    assert_eq!(
        lo.client.remote_ident(),
        Some(*lo.server_ctx.ident_hash())
    );

    // A 100-byte message arrives byte-identical.
    let payload: Vec<u8> = (0..100u8).collect();
    lo.client.send_message(NetworkMessage::from_payload(&payload));
    assert_eq!(recv(&mut lo.server_rx).await, payload);

    // Replies flow the other way on the same session.
    let sessions = lo.server_registry.sessions();
    sessions[0].send_message(NetworkMessage::from_payload(b"reply"));
    assert_eq!(recv(&mut lo.client_rx).await, b"reply");
}

#[tokio::test]
async fn test_deferred_message_follows_announcement() {
    let mut lo = loopback().await;

    // Submitted before establishment: parks in the deferred slot. The
    // slot is one deep; the second submission is dropped.
    lo.client
        .send_message(NetworkMessage::from_payload(b"queued before login"));
    lo.client
        .send_message(NetworkMessage::from_payload(b"overflow is dropped"));

    tokio::spawn(lo.client.clone().run(lo.client_stream));

    let first = recv(&mut lo.server_rx).await;
    assert!(first.starts_with(b"dbstore:"), "announcement must go first");
    let second = recv(&mut lo.server_rx).await;
    assert_eq!(second, b"queued before login");

    // Nothing else is queued.
    assert!(
        timeout(Duration::from_millis(300), lo.server_rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_time_sync_delivers_no_message() {
    let mut lo = loopback().await;
    tokio::spawn(lo.client.clone().run(lo.client_stream));

    // Drain both announcements.
    recv(&mut lo.server_rx).await;
    recv(&mut lo.client_rx).await;

    lo.client.send_time_sync();
    assert!(
        timeout(Duration::from_millis(300), lo.server_rx.recv())
            .await
            .is_err(),
        "keep-alive must not surface as an inner message"
    );

    // The stream stays usable afterwards.
    lo.client
        .send_message(NetworkMessage::from_payload(b"still in sync"));
    assert_eq!(recv(&mut lo.server_rx).await, b"still in sync");
}

#[tokio::test]
async fn test_terminate_tears_down_both_sides() {
    let mut lo = loopback().await;
    tokio::spawn(lo.client.clone().run(lo.client_stream));

    recv(&mut lo.server_rx).await;
    recv(&mut lo.client_rx).await;
    assert_eq!(lo.server_registry.len(), 1);

    lo.client.terminate();
    assert!(!lo.client.is_established());
    assert_eq!(lo.client_registry.len(), 0);

    // Terminating again is harmless.
    lo.client.terminate();

    // The peer observes the close and unwinds too.
    timeout(Duration::from_secs(10), lo.server_task)
        .await
        .expect("server task did not finish")
        .unwrap();
    assert_eq!(lo.server_registry.len(), 0);
}

#[tokio::test]
async fn test_messages_after_terminate_are_dropped() {
    let mut lo = loopback().await;
    tokio::spawn(lo.client.clone().run(lo.client_stream));
    recv(&mut lo.server_rx).await;

    lo.client.terminate();
    // No panic, no send: the session is gone.
    lo.client
        .send_message(NetworkMessage::from_payload(b"too late"));
}

#[tokio::test]
async fn test_handshake_watchdog_terminates_stalled_peer() {
    let server_ctx = Arc::new(RouterContext::generate());
    let registry = SessionRegistry::new();
    let (tx, _rx) = mpsc::unbounded_channel();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let session = Session::new(
        Role::Responder,
        server_ctx,
        RouterInfo::unknown(),
        registry.clone(),
        Arc::new(TestDispatcher { tx }),
        Duration::from_millis(200),
    );
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        session.run(stream).await;
    });

    // Connect and go silent: the watchdog must fire.
    let _stalled = TcpStream::connect(addr).await.unwrap();
    timeout(Duration::from_secs(10), task)
        .await
        .expect("watchdog did not fire")
        .unwrap();
    assert_eq!(registry.len(), 0);
}
