//! # Messaging Module
//!
//! The chat log kept by a session.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          MESSAGE LOG                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   send("hello") ──► sealed ──► transport ok ──► append { self, ... }   │
//! │                                                                         │
//! │   Data frame ──► opened ──► append { peer, ..., verified: true }       │
//! │                    │                                                    │
//! │                    └── fails ──► (ShowRaw) append { peer, raw,         │
//! │                                             verified: false }          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The log is append-only, in order of local observation, and lives only
//! as long as the session. Nothing is persisted.

use serde::{Deserialize, Serialize};

use crate::time::now_timestamp_millis;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Sent by this side
    #[serde(rename = "self")]
    Local,
    /// Received from the peer
    #[serde(rename = "peer")]
    Peer,
}

/// One entry in the chat log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Random identifier, unique within the log
    pub id: String,
    /// Who produced it
    pub origin: Origin,
    /// Message text
    pub text: String,
    /// When it was appended (Unix millis)
    pub timestamp: i64,
    /// Whether the text came out of an authenticated decrypt
    ///
    /// Always true for local messages.
    pub verified: bool,
}

impl Message {
    fn new(origin: Origin, text: String, verified: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            origin,
            text,
            timestamp: now_timestamp_millis(),
            verified,
        }
    }

    /// A message this side sent
    pub fn local(text: impl Into<String>) -> Self {
        Self::new(Origin::Local, text.into(), true)
    }

    /// An authenticated message from the peer
    pub fn peer(text: impl Into<String>) -> Self {
        Self::new(Origin::Peer, text.into(), true)
    }

    /// Raw peer input that could not be authenticated
    pub fn unverified_peer(raw: impl Into<String>) -> Self {
        Self::new(Origin::Peer, raw.into(), false)
    }

    /// Check if this side sent the message
    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }
}

/// Append-only chat log
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn append(&mut self, message: Message) {
        self.entries.push(message);
    }

    /// All entries in append order
    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }
}
