//! Inbound and outbound wire events.
//!
//! Both directions use adjacently tagged JSON: `{"event": name, "data": {..}}`,
//! with camelCase event and field names.

use crate::category::CategorySet;
use crate::disconnect::DisconnectKind;
use crate::error::ProtocolError;
use crate::role::Role;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A chat message as relayed between room members.
///
/// Only `text` is required. The remaining fields are client-assigned and
/// forwarded untouched, including any keys this server does not know about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    /// Client-assigned message id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message body.
    pub text: String,
    /// Sender display name as the client set it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Client timestamp, in whatever form the client uses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    /// Unrecognized fields, preserved for verbatim relay.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatPayload {
    /// A payload carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            sender: None,
            timestamp: None,
            extra: Map::new(),
        }
    }
}

/// Public identity of the user a client was matched with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterpart {
    /// Display name; absent for anonymous users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The counterpart's role (always the opposite of the recipient's).
    pub role: Role,
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Bind a name to this connection.
    Authenticate {
        /// Display name.
        name: String,
    },
    /// Ask to be paired with an opposite-role user sharing a category.
    FindMatch {
        /// Declared role; required for matching.
        #[serde(default)]
        role: Option<Role>,
        /// Topic tags, as an array or an array encoded in a string.
        #[serde(default, alias = "cat")]
        categories: CategorySet,
        /// Name to match as; ignored once the connection is authenticated.
        #[serde(default, alias = "user", skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Enter a room allocated by a match.
    JoinRoom {
        /// Room identifier from `matchFound`.
        room_id: String,
    },
    /// Relay a chat message to the other member of a room.
    SendMessage {
        /// Target room.
        room_id: String,
        /// Message body and client metadata.
        payload: ChatPayload,
    },
    /// Leave a room voluntarily.
    LeaveRoom {
        /// Room to leave.
        room_id: String,
    },
    /// Announce an imminent disconnect, with an optional reason.
    Disconnect {
        /// Raw reason string.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Application-level health check; the data is echoed back.
    Ping(Value),
    /// Combined authenticate-and-join used when a client re-establishes a session.
    ClientConnect {
        /// Name to authenticate as.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// Display name, preferred over `userId` when both are present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        /// Room to join immediately.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
    },
    /// Join a matched room and tell the partner.
    AcceptMatch {
        /// Room identifier from `matchFound`.
        room_id: String,
    },
    /// Reject a match; both users become available again.
    DeclineMatch {
        /// Room identifier from `matchFound`.
        room_id: String,
    },
    /// Withdraw a pending match request.
    CancelMatch,
}

impl ClientEvent {
    /// Decode one text frame.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Encode for sending.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Static event name for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::FindMatch { .. } => "findMatch",
            Self::JoinRoom { .. } => "joinRoom",
            Self::SendMessage { .. } => "sendMessage",
            Self::LeaveRoom { .. } => "leaveRoom",
            Self::Disconnect { .. } => "disconnect",
            Self::Ping(_) => "ping",
            Self::ClientConnect { .. } => "clientConnect",
            Self::AcceptMatch { .. } => "acceptMatch",
            Self::DeclineMatch { .. } => "declineMatch",
            Self::CancelMatch => "cancelMatch",
        }
    }
}

/// Notifications the server emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// First frame on every connection.
    ConnectionEstablished {
        /// Opaque connection handle.
        connection_id: String,
        /// Configured server name.
        server: String,
        /// Server time, unix milliseconds.
        timestamp: i64,
    },
    /// The name is now bound to this connection.
    AuthenticationConfirmed {
        /// The bound name.
        name: String,
    },
    /// Result of `clientConnect`.
    ConnectAck {
        /// Whether a room was joined.
        room_joined: bool,
        /// Occupancy of that room after joining, 0 otherwise.
        room_size: usize,
    },
    /// Reply to `ping`.
    Pong {
        /// Server time, unix milliseconds.
        timestamp: i64,
        /// The ping data, echoed back.
        echo: Value,
    },
    /// No counterpart yet; the request is queued.
    SearchingForMatch {
        /// Display text.
        message: String,
    },
    /// A counterpart was found and a room allocated.
    MatchFound {
        /// Room both users should join.
        room_id: String,
        /// Who the recipient was paired with.
        matched_with: Counterpart,
        /// Categories both users share.
        common_categories: CategorySet,
    },
    /// The match request failed.
    MatchError {
        /// Display text.
        reason: String,
    },
    /// A participant accepted the match.
    MatchAccepted {
        /// The matched room.
        room_id: String,
    },
    /// A participant declined; the room is gone.
    MatchDeclined {
        /// The torn-down room.
        room_id: String,
        /// Whether the recipient was the one who declined.
        by_you: bool,
    },
    /// The pending match request was withdrawn.
    MatchCancelled,
    /// The recipient joined a room.
    RoomJoined {
        /// The room.
        room_id: String,
        /// Occupancy after the join.
        users_in_room: usize,
    },
    /// Another user joined the recipient's room.
    UserJoinedRoom {
        /// The room.
        room_id: String,
        /// Occupancy after the join.
        users_in_room: usize,
        /// The joiner's name, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
    },
    /// Both users are present; chatting may begin.
    RoomReady {
        /// The room.
        room_id: String,
        /// Occupancy (always 2).
        users_in_room: usize,
    },
    /// A relayed chat message.
    ReceiveMessage(ChatPayload),
    /// The other user left the recipient's room.
    UserLeftRoom {
        /// The room.
        room_id: String,
        /// Occupancy after the leave.
        users_in_room: usize,
        /// Whether the leave was caused by a disconnect.
        disconnected: bool,
        /// Human-readable disconnect reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// Coarse disconnect classification.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason_code: Option<DisconnectKind>,
    },
    /// The recipient's leave emptied and closed the room.
    RoomClosed {
        /// The closed room.
        room_id: String,
    },
    /// A request could not be processed.
    Error {
        /// Stable machine-readable code.
        code: String,
        /// Display text.
        message: String,
    },
}

impl ServerEvent {
    /// Build an `error` notification.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Decode one text frame.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Encode for sending.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Static event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connectionEstablished",
            Self::AuthenticationConfirmed { .. } => "authenticationConfirmed",
            Self::ConnectAck { .. } => "connectAck",
            Self::Pong { .. } => "pong",
            Self::SearchingForMatch { .. } => "searchingForMatch",
            Self::MatchFound { .. } => "matchFound",
            Self::MatchError { .. } => "matchError",
            Self::MatchAccepted { .. } => "matchAccepted",
            Self::MatchDeclined { .. } => "matchDeclined",
            Self::MatchCancelled => "matchCancelled",
            Self::RoomJoined { .. } => "roomJoined",
            Self::UserJoinedRoom { .. } => "userJoinedRoom",
            Self::RoomReady { .. } => "roomReady",
            Self::ReceiveMessage(_) => "receiveMessage",
            Self::UserLeftRoom { .. } => "userLeftRoom",
            Self::RoomClosed { .. } => "roomClosed",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn find_match_accepts_legacy_field_names() {
        let raw =
            r#"{"event":"findMatch","data":{"role":"support-seeker","cat":"[1,3]","user":"wren"}}"#;
        let event = ClientEvent::decode(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::FindMatch {
                role: Some(Role::SupportSeeker),
                categories: CategorySet::from([1, 3]),
                name: Some("wren".into()),
            }
        );
    }

    #[test]
    fn find_match_without_role_still_decodes() {
        let raw = r#"{"event":"findMatch","data":{"categories":[2]}}"#;
        match ClientEvent::decode(raw).unwrap() {
            ClientEvent::FindMatch { role, name, .. } => {
                assert!(role.is_none());
                assert!(name.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_role_is_malformed() {
        let raw = r#"{"event":"findMatch","data":{"role":"therapist","categories":[2]}}"#;
        let err = ClientEvent::decode(raw).unwrap_err();
        assert_eq!(err.code(), "malformed_event");
    }

    #[test]
    fn unknown_event_is_malformed() {
        assert!(ClientEvent::decode(r#"{"event":"teleport","data":{}}"#).is_err());
        assert!(ClientEvent::decode("not json").is_err());
        assert!(ClientEvent::decode(r#"{"event":"joinRoom","data":{"roomId":7}}"#).is_err());
    }

    #[test]
    fn unit_events_need_no_data() {
        assert_eq!(
            ClientEvent::decode(r#"{"event":"cancelMatch"}"#).unwrap(),
            ClientEvent::CancelMatch
        );
    }

    #[test]
    fn chat_payload_keeps_unknown_fields() {
        let raw = json!({
            "event": "sendMessage",
            "data": {
                "roomId": "r1",
                "payload": {"id": "m1", "text": "hi", "timestamp": 17, "mood": "calm"}
            }
        })
        .to_string();
        let ClientEvent::SendMessage { payload, .. } = ClientEvent::decode(&raw).unwrap() else {
            panic!("expected sendMessage");
        };
        assert_eq!(payload.extra.get("mood"), Some(&json!("calm")));

        let relayed = ServerEvent::ReceiveMessage(payload).encode().unwrap();
        let value: Value = serde_json::from_str(&relayed).unwrap();
        assert_eq!(value["event"], "receiveMessage");
        assert_eq!(value["data"]["mood"], "calm");
        assert_eq!(value["data"]["timestamp"], 17);
    }

    #[test]
    fn user_left_room_shape() {
        let event = ServerEvent::UserLeftRoom {
            room_id: "r".into(),
            users_in_room: 1,
            disconnected: true,
            reason: Some("Transport connection lost".into()),
            reason_code: Some(DisconnectKind::TransportFailure),
        };
        let value: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(value["data"]["usersInRoom"], 1);
        assert_eq!(value["data"]["reasonCode"], "transport_failure");
    }
}
