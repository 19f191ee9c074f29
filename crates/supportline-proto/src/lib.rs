//! # supportline-proto
//!
//! Wire protocol for the supportline daemon: the closed set of events a
//! client may send and the notifications the server emits, plus the small
//! domain vocabulary shared by both sides (roles, category sets, disconnect
//! reasons, identity case-folding).
//!
//! Every WebSocket text frame carries exactly one event encoded as
//! adjacently tagged JSON:
//!
//! ```rust
//! use supportline_proto::{ClientEvent, Role};
//!
//! let raw = r#"{"event":"findMatch","data":{"role":"listener","categories":[1,2],"name":"ash"}}"#;
//! let event = ClientEvent::decode(raw).expect("valid event");
//! match event {
//!     ClientEvent::FindMatch { role, categories, .. } => {
//!         assert_eq!(role, Some(Role::Listener));
//!         assert_eq!(categories.len(), 2);
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod category;
pub mod disconnect;
pub mod error;
pub mod event;
pub mod role;

pub use casemap::{name_key, names_eq, normalize_name, MAX_NAME_LEN};
pub use category::CategorySet;
pub use disconnect::{DisconnectKind, DisconnectReason};
pub use error::ProtocolError;
pub use event::{ChatPayload, ClientEvent, Counterpart, ServerEvent};
pub use role::Role;
