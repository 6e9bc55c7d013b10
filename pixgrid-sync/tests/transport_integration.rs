//! Connection lifecycle: reconnect, dropped sends, frame ordering.

mod support;

use std::time::Duration;

use pixgrid_sync::{
    ConnectionState, GridEvent, GridSession, SessionConfig, Transport, TransportEvent,
};
use support::{free_port, wait_for, TestGridServer};
use tokio::sync::mpsc;

fn fast_config(url: impl Into<String>) -> SessionConfig {
    SessionConfig {
        reconnect_delay: Duration::from_millis(100),
        ..SessionConfig::with_url(url)
    }
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let server = TestGridServer::start(625).await;
    let mut session = GridSession::new(fast_config(server.url.clone()));
    let mut events = session.take_event_rx().unwrap();
    session.start();

    let GridEvent::IdentityAssigned(first_id) =
        wait_for(&mut events, "identity", |e| matches!(e, GridEvent::IdentityAssigned(_))).await
    else {
        unreachable!()
    };

    server.kick_all();
    wait_for(&mut events, "disconnect", |e| *e == GridEvent::Disconnected).await;
    wait_for(&mut events, "reconnect", |e| *e == GridEvent::Connected).await;
    let GridEvent::IdentityAssigned(second_id) =
        wait_for(&mut events, "new identity", |e| matches!(e, GridEvent::IdentityAssigned(_))).await
    else {
        unreachable!()
    };

    assert_ne!(first_id, second_id);
    assert_eq!(server.accepted(), 2);
    assert_eq!(session.transport_stats().reconnects_scheduled, 1);
    assert_eq!(session.identity().await, Some(second_id));

    session.stop().await;
}

#[tokio::test]
async fn test_identity_cleared_on_disconnect() {
    let server = TestGridServer::start(625).await;
    let mut session = GridSession::new(SessionConfig {
        reconnect_delay: Duration::from_secs(5),
        ..SessionConfig::with_url(server.url.clone())
    });
    let mut events = session.take_event_rx().unwrap();
    session.start();
    wait_for(&mut events, "identity", |e| matches!(e, GridEvent::IdentityAssigned(_))).await;
    assert!(session.identity().await.is_some());

    server.kick_all();
    wait_for(&mut events, "disconnect", |e| *e == GridEvent::Disconnected).await;

    assert_eq!(session.identity().await, None);
    assert!(!session.move_cursor(3.0, 4.0).await, "no stale id on the wire");
    assert!(session.participants().await.is_empty());

    session.stop().await;
}

#[tokio::test]
async fn test_sends_dropped_while_disconnected() {
    let url = format!("ws://127.0.0.1:{}/api/ws", free_port().await);
    let mut session = GridSession::new(fast_config(url));
    session.start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(session.toggle_cell(1), "accepted locally even when offline");
    tokio::time::sleep(Duration::from_millis(350)).await;

    let stats = session.transport_stats();
    assert_eq!(stats.sends_dropped, 1);
    assert_eq!(stats.frames_sent, 0);
    assert!(stats.reconnects_scheduled >= 2, "keeps retrying: {stats:?}");
    assert!(matches!(
        session.connection_state().await,
        ConnectionState::Connecting | ConnectionState::Closed { retry_pending: true }
    ));

    session.stop().await;
    assert_eq!(session.connection_state().await, ConnectionState::Stopped);
}

#[tokio::test]
async fn test_stop_cancels_pending_reconnect() {
    let server = TestGridServer::start(625).await;
    let mut session = GridSession::new(fast_config(server.url.clone()));
    let mut events = session.take_event_rx().unwrap();
    session.start();
    wait_for(&mut events, "connected", |e| *e == GridEvent::Connected).await;

    server.kick_all();
    wait_for(&mut events, "disconnect", |e| *e == GridEvent::Disconnected).await;
    session.stop().await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.accepted(), 1);
    assert_eq!(session.connection_state().await, ConnectionState::Stopped);
}

#[tokio::test]
async fn test_connect_while_open_is_noop() {
    let server = TestGridServer::start(625).await;
    let (tx, mut rx) = mpsc::channel(64);
    let mut transport = Transport::new(server.url.clone(), Duration::from_millis(100));
    transport.start(tx);
    wait_for(&mut rx, "open", |e| *e == TransportEvent::Opened).await;

    for _ in 0..3 {
        transport.connect().unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(server.accepted(), 1);
    assert_eq!(transport.state().await, ConnectionState::Open);
    transport.stop().await;
}

#[tokio::test]
async fn test_frames_arrive_in_order() {
    let server = TestGridServer::start(625).await;
    let (tx, mut rx) = mpsc::channel(256);
    let mut transport = Transport::new(server.url.clone(), Duration::from_millis(100));
    transport.start(tx);
    wait_for(&mut rx, "open", |e| *e == TransportEvent::Opened).await;

    let sent: Vec<String> = (0..50).map(|i| format!("s:{i}:1")).collect();
    for frame in &sent {
        server.broadcast(frame);
    }

    let mut received = Vec::new();
    while received.len() < sent.len() {
        let TransportEvent::Frame(text) = wait_for(&mut rx, "frame", |e| {
            matches!(e, TransportEvent::Frame(t) if t.starts_with("s:"))
        })
        .await
        else {
            unreachable!()
        };
        received.push(text);
    }
    assert_eq!(received, sent);
    transport.stop().await;
}

#[tokio::test]
async fn test_outgoing_frames_reach_server() {
    let server = TestGridServer::start(625).await;
    let (tx, mut rx) = mpsc::channel(64);
    let mut transport = Transport::new(server.url.clone(), Duration::from_millis(100));
    transport.start(tx);
    wait_for(&mut rx, "open", |e| *e == TransportEvent::Opened).await;

    transport.send("set:5");
    transport.send("s:6");
    wait_for(&mut rx, "echo", |e| *e == TransportEvent::Frame("s:6:1".into())).await;

    assert_eq!(server.received(), vec!["set:5".to_string(), "s:6".to_string()]);
    assert_eq!(transport.stats().frames_sent, 2);
    transport.stop().await;
}
