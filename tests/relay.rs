//! Chat relay integration tests.

mod common;

use common::{ServerOptions, TestServer, paired};
use serde_json::json;
use supportline_proto::{ChatPayload, ClientEvent, ServerEvent};

#[tokio::test]
async fn payload_is_relayed_verbatim_without_echo() {
    let server = TestServer::spawn().await.expect("spawn server");
    let (mut ann, mut bo, room_id) = paired(&server, "ann", "bo").await.unwrap();

    let mut payload = ChatPayload::text("hello there");
    payload.id = Some("m-1".into());
    payload.sender = Some("ann".into());
    payload.timestamp = Some(json!(1_700_000_000_000_i64));
    payload.extra.insert("mood".into(), json!("calm"));

    ann.send(ClientEvent::SendMessage {
        room_id: room_id.clone(),
        payload: payload.clone(),
    })
    .await
    .unwrap();

    assert_eq!(
        bo.recv().await.unwrap(),
        ServerEvent::ReceiveMessage(payload)
    );
    ann.expect_silence().await.unwrap();

    bo.send(ClientEvent::SendMessage {
        room_id,
        payload: ChatPayload::text("hi"),
    })
    .await
    .unwrap();
    assert_eq!(
        ann.recv().await.unwrap(),
        ServerEvent::ReceiveMessage(ChatPayload::text("hi"))
    );
}

#[tokio::test]
async fn oversized_message_is_refused() {
    let server = TestServer::spawn_with(ServerOptions {
        max_message_bytes: 16,
        ..Default::default()
    })
    .await
    .expect("spawn server");
    let (mut ann, mut bo, room_id) = paired(&server, "ann", "bo").await.unwrap();

    ann.send(ClientEvent::SendMessage {
        room_id,
        payload: ChatPayload::text("seventeen bytes!!"),
    })
    .await
    .unwrap();
    match ann.recv().await.unwrap() {
        ServerEvent::Error { code, .. } => assert_eq!(code, "message_too_large"),
        other => panic!("expected error, got {other:?}"),
    }
    bo.expect_silence().await.unwrap();
}

#[tokio::test]
async fn non_members_cannot_send() {
    let server = TestServer::spawn().await.expect("spawn server");
    let (_ann, mut bo, room_id) = paired(&server, "ann", "bo").await.unwrap();
    let mut eve = server.connect().await.unwrap();

    eve.send(ClientEvent::SendMessage {
        room_id,
        payload: ChatPayload::text("psst"),
    })
    .await
    .unwrap();
    match eve.recv().await.unwrap() {
        ServerEvent::Error { code, .. } => assert_eq!(code, "not_in_room"),
        other => panic!("expected error, got {other:?}"),
    }
    bo.expect_silence().await.unwrap();
}

#[tokio::test]
async fn unknown_room_is_dropped_silently() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut client = server.connect().await.unwrap();

    client
        .send(ClientEvent::SendMessage {
            room_id: "no-such-room".into(),
            payload: ChatPayload::text("anyone?"),
        })
        .await
        .unwrap();
    client.expect_silence().await.unwrap();
}
