//! Session lifecycle states.
//!
//! ```text
//!            create_offer               finalize(answer)
//!   Idle ───────────────► Offering ─► AwaitingAnswer ──────────┐
//!     │                                                        ▼
//!     │     accept_offer(offer)                            Connecting ──► Open ──► Closed
//!     └──────────────────────────► Answering ──────────────────┘    │        │
//!                                                                   ▼        ▼
//!                                                                 Failed   Failed
//! ```
//!
//! `Closed` and `Failed` are terminal. Any state can reach them through
//! teardown or a transport failure.

use serde::{Deserialize, Serialize};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing started yet
    #[default]
    Idle,
    /// Producing the local offer
    Offering,
    /// Offer exported; waiting for the peer's answer
    AwaitingAnswer,
    /// Producing the local answer
    Answering,
    /// Descriptors exchanged; waiting for the channel
    Connecting,
    /// Channel usable
    Open,
    /// Ended normally
    Closed,
    /// Ended by a connectivity or internal failure
    Failed,
}

impl SessionState {
    /// Check if the session can no longer make progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Short lowercase name for display and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Offering => "offering",
            Self::AwaitingAnswer => "awaiting-answer",
            Self::Answering => "answering",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the handshake this session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Generated the offer and the salt
    Offerer,
    /// Accepted an offer and received the salt
    Answerer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offerer => f.write_str("offerer"),
            Self::Answerer => f.write_str("answerer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Open.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }

    #[test]
    fn test_default_is_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
        assert_eq!(SessionState::AwaitingAnswer.to_string(), "awaiting-answer");
    }
}
