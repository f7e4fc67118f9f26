//! # Session Events
//!
//! Everything a session reports to its subscribers.

use super::state::SessionState;
use crate::messaging::Message;

/// Events broadcast by a chat session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The lifecycle state changed
    StatusChanged {
        /// The new state
        state: SessionState,
    },

    /// Informational progress from the transport
    TransportStatus {
        /// Transport-defined description
        detail: String,
    },

    /// A local descriptor is ready to hand to the peer
    LocalDescriptor {
        /// Text-safe descriptor
        descriptor: String,
    },

    /// The session key is derived
    KeyReady {
        /// Short digest both users can compare out-of-band
        fingerprint: String,
    },

    /// The salt was sent (offerer) or received (answerer)
    SaltDelivered,

    /// A local message was transmitted and logged
    MessageSent(Message),

    /// A peer message was logged
    MessageReceived(Message),

    /// An inbound data frame failed authentication
    AuthenticationFailed {
        /// Why it was rejected
        reason: String,
    },

    /// An inbound frame could not be parsed
    FrameRejected {
        /// Why it was rejected
        reason: String,
    },

    /// The session hit an error
    Error {
        /// Numeric error code
        code: i32,
        /// Error message
        message: String,
    },
}
