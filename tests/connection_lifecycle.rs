//! Connection lifecycle integration tests.
//!
//! Covers the greeting, application pings, frame rejection, identity
//! conflicts, origin filtering and the disconnect cascade.

mod common;

use common::{ServerOptions, TestServer, paired};
use futures_util::StreamExt;
use serde_json::json;
use std::time::Duration;
use supportline_proto::{ClientEvent, DisconnectKind, ServerEvent};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

#[tokio::test]
async fn greeting_carries_unique_connection_id() {
    let server = TestServer::spawn().await.expect("spawn server");
    let first = server.connect().await.expect("connect");
    let second = server.connect().await.expect("connect");

    assert!(!first.connection_id.is_empty());
    assert_ne!(first.connection_id, second.connection_id);
}

#[tokio::test]
async fn ping_is_answered_with_echo() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut client = server.connect().await.expect("connect");

    client
        .send(ClientEvent::Ping(json!({"seq": 7})))
        .await
        .unwrap();
    match client.recv().await.unwrap() {
        ServerEvent::Pong { timestamp, echo } => {
            assert!(timestamp > 0);
            assert_eq!(echo, json!({"seq": 7}));
        }
        other => panic!("expected pong, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_frames_are_rejected_without_closing() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut client = server.connect().await.expect("connect");

    client.send_raw(Message::Text("not json".into())).await.unwrap();
    match client.recv().await.unwrap() {
        ServerEvent::Error { code, .. } => assert_eq!(code, "malformed_event"),
        other => panic!("expected error, got {other:?}"),
    }

    client.send_raw(Message::Binary(vec![0xde, 0xad])).await.unwrap();
    match client.recv().await.unwrap() {
        ServerEvent::Error { code, .. } => assert_eq!(code, "binary_frame"),
        other => panic!("expected error, got {other:?}"),
    }

    // Still usable.
    client
        .send(ClientEvent::Authenticate { name: "wren".into() })
        .await
        .unwrap();
    assert_eq!(
        client.recv().await.unwrap(),
        ServerEvent::AuthenticationConfirmed { name: "wren".into() }
    );
}

#[tokio::test]
async fn name_in_use_is_case_insensitive() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut first = server.connect().await.expect("connect");
    let mut second = server.connect().await.expect("connect");

    first
        .send(ClientEvent::Authenticate { name: "Ash".into() })
        .await
        .unwrap();
    first.expect("authenticationConfirmed").await.unwrap();

    second
        .send(ClientEvent::Authenticate { name: "ASH".into() })
        .await
        .unwrap();
    match second.recv().await.unwrap() {
        ServerEvent::Error { code, .. } => assert_eq!(code, "name_in_use"),
        other => panic!("expected error, got {other:?}"),
    }

    // Released on disconnect.
    first.close().await.unwrap();
    let mut freed = false;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        second
            .send(ClientEvent::Authenticate { name: "ash".into() })
            .await
            .unwrap();
        if let ServerEvent::AuthenticationConfirmed { .. } = second.recv().await.unwrap() {
            freed = true;
            break;
        }
    }
    assert!(freed, "name was never released");
}

#[tokio::test]
async fn disconnect_notifies_partner_and_resets_availability() {
    let server = TestServer::spawn().await.expect("spawn server");
    let (mut a, mut b, room_id) = paired(&server, "ann", "bo").await.unwrap();

    assert_eq!(server.is_available("ann").await.unwrap(), Some(false));

    a.send(ClientEvent::Disconnect {
        reason: Some("ping timeout".into()),
    })
    .await
    .unwrap();

    assert_eq!(
        b.expect("userLeftRoom").await.unwrap(),
        ServerEvent::UserLeftRoom {
            room_id,
            users_in_room: 1,
            disconnected: true,
            reason: Some("Connection timeout due to poor network".into()),
            reason_code: Some(DisconnectKind::Timeout),
        }
    );
    server.wait_for_availability("ann", true).await.unwrap();
}

#[tokio::test]
async fn close_frame_is_reported_as_voluntary() {
    let server = TestServer::spawn().await.expect("spawn server");
    let (a, mut b, _room_id) = paired(&server, "ann", "bo").await.unwrap();

    a.close().await.unwrap();

    match b.expect("userLeftRoom").await.unwrap() {
        ServerEvent::UserLeftRoom {
            disconnected,
            reason_code,
            ..
        } => {
            assert!(disconnected);
            assert_eq!(reason_code, Some(DisconnectKind::Voluntary));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn disallowed_origin_is_refused_at_handshake() {
    let server = TestServer::spawn_with(ServerOptions {
        allow_origins: vec!["https://app.example".into()],
        ..Default::default()
    })
    .await
    .expect("spawn server");

    let mut request = format!("ws://{}", server.address())
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://evil.example".parse().unwrap());

    match tokio_tungstenite::connect_async(request).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 403);
        }
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("handshake should have been refused"),
    }

    let mut request = format!("ws://{}", server.address())
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://app.example".parse().unwrap());
    let (mut ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("allowed origin connects");
    let Some(Ok(Message::Text(greeting))) = ws.next().await else {
        panic!("expected greeting");
    };
    assert_eq!(
        ServerEvent::decode(&greeting).unwrap().name(),
        "connectionEstablished"
    );
}

#[tokio::test]
async fn silent_client_times_out() {
    let server = TestServer::spawn_with(ServerOptions {
        ping_secs: 1,
        timeout_secs: 1,
        ..Default::default()
    })
    .await
    .expect("spawn server");
    let (_silent, mut b, _room_id) = paired(&server, "ann", "bo").await.unwrap();

    // `b` keeps reading, so it answers pings; `_silent` never reads again.
    match b.expect("userLeftRoom").await.unwrap() {
        ServerEvent::UserLeftRoom {
            disconnected,
            reason_code,
            ..
        } => {
            assert!(disconnected);
            assert_eq!(reason_code, Some(DisconnectKind::Timeout));
        }
        other => panic!("unexpected {other:?}"),
    }
}
