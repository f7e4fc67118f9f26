//! # Salt Exchange
//!
//! One-time, in-band delivery of the offerer's salt.
//!
//! ```text
//!   Offerer                                   Answerer
//!   ───────                                   ────────
//!   create_offer: salt ← random(16)
//!                 derive key (no waiting)
//!        │
//!   channel open ──── { "salt": [...] } ────► store salt
//!                                             derive key
//! ```
//!
//! The salt is not secret. It only has to be unique per session and
//! identical on both ends. Once stored it is never replaced.

use super::frame::Frame;
use crate::crypto::Salt;
use crate::error::Result;

/// Outcome of receiving a control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaltReceipt {
    /// First salt on the answerer; the key can now be derived
    Stored(Salt),
    /// The answerer already has a salt; the frame is ignored
    Duplicate,
    /// The offerer never accepts a salt; the frame is ignored
    Unexpected,
}

/// Per-role salt exchange state
#[derive(Debug, Clone)]
pub enum SaltExchange {
    /// Holds the locally generated salt until it has been sent
    Offerer {
        /// The session salt
        salt: Salt,
        /// Whether the control frame has been handed to the transport
        sent: bool,
    },
    /// Waits for the offerer's control frame
    Answerer {
        /// The received salt, once delivered
        salt: Option<Salt>,
    },
}

impl SaltExchange {
    /// Offerer side, owning a freshly generated salt
    pub fn offerer(salt: Salt) -> Self {
        SaltExchange::Offerer { salt, sent: false }
    }

    /// Answerer side, waiting for delivery
    pub fn answerer() -> Self {
        SaltExchange::Answerer { salt: None }
    }

    /// The salt, if known on this side
    pub fn salt(&self) -> Option<&Salt> {
        match self {
            SaltExchange::Offerer { salt, .. } => Some(salt),
            SaltExchange::Answerer { salt } => salt.as_ref(),
        }
    }

    /// Whether the salt has been delivered (offerer: sent; answerer: received)
    pub fn is_delivered(&self) -> bool {
        match self {
            SaltExchange::Offerer { sent, .. } => *sent,
            SaltExchange::Answerer { salt } => salt.is_some(),
        }
    }

    /// The control frame to flush on channel open
    ///
    /// Returns the frame exactly once on the offerer and never on the
    /// answerer.
    pub fn take_outbound(&mut self) -> Option<Frame> {
        match self {
            SaltExchange::Offerer { salt, sent } if !*sent => {
                *sent = true;
                Some(Frame::control(salt))
            }
            _ => None,
        }
    }

    /// Handle an inbound control frame's salt bytes
    ///
    /// Fails with `InvalidKey` when the salt is not 16 bytes; the stored
    /// state is left untouched in that case.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<SaltReceipt> {
        match self {
            SaltExchange::Offerer { .. } => Ok(SaltReceipt::Unexpected),
            SaltExchange::Answerer { salt: Some(_) } => Ok(SaltReceipt::Duplicate),
            SaltExchange::Answerer { salt } => {
                let received = Salt::from_slice(bytes)?;
                *salt = Some(received);
                Ok(SaltReceipt::Stored(received))
            }
        }
    }
}
