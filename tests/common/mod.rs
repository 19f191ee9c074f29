//! Integration test common infrastructure.
//!
//! Provides utilities for spawning test servers, creating WebSocket test
//! clients, and asserting on typed event flows.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::{ServerOptions, TestServer};

use supportline_proto::{ClientEvent, Role, ServerEvent};

/// A `findMatch` event.
#[allow(dead_code)]
pub fn find_match(role: Role, categories: &[u32], name: Option<&str>) -> ClientEvent {
    ClientEvent::FindMatch {
        role: Some(role),
        categories: categories.iter().copied().collect(),
        name: name.map(str::to_string),
    }
}

/// Match a seeker and a listener on category 1 and bring both into the
/// room. Returns `(seeker, listener, room_id)`.
#[allow(dead_code)]
pub async fn paired(
    server: &TestServer,
    seeker: &str,
    listener: &str,
) -> anyhow::Result<(TestClient, TestClient, String)> {
    let mut a = server.connect().await?;
    let mut b = server.connect().await?;

    a.send(find_match(Role::SupportSeeker, &[1], Some(seeker))).await?;
    a.expect("searchingForMatch").await?;
    b.send(find_match(Role::Listener, &[1], Some(listener))).await?;

    let ServerEvent::MatchFound { room_id, .. } = a.expect("matchFound").await? else {
        anyhow::bail!("expected matchFound");
    };
    b.expect("roomJoined").await?;
    a.send(ClientEvent::JoinRoom {
        room_id: room_id.clone(),
    })
    .await?;
    a.expect("roomReady").await?;
    b.expect("roomReady").await?;

    Ok((a, b, room_id))
}
