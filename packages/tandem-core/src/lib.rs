//! # Tandem Core
//!
//! Two people, one passphrase, one direct channel. Tandem establishes a
//! peer-to-peer channel through copy-pasted descriptors and encrypts every
//! chat message under a key derived from a passphrase both sides typed.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          TANDEM CORE                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                         ChatSession                               │ │
//! │  │   create_offer · accept_offer · finalize · send · messages        │ │
//! │  └───────────────────────────────┬───────────────────────────────────┘ │
//! │                                  │ SessionCommand                       │
//! │  ┌───────────────────────────────▼───────────────────────────────────┐ │
//! │  │                     Session state machine                         │ │
//! │  │     Idle → Offering/Answering → Connecting → Open → Closed        │ │
//! │  └───────┬──────────────────────┬──────────────────────┬─────────────┘ │
//! │          │                      │                      │               │
//! │  ┌───────▼───────┐    ┌─────────▼────────┐    ┌────────▼────────────┐ │
//! │  │    Crypto     │    │     Protocol     │    │     Transport       │ │
//! │  │               │    │                  │    │                     │ │
//! │  │ PBKDF2-SHA256 │    │ Frame (JSON)     │    │ PeerTransport trait │ │
//! │  │ AES-256-GCM   │    │ FrameCodec       │    │ Memory · TCP        │ │
//! │  │ OsRng         │    │ SaltExchange     │    │ SignalingData       │ │
//! │  └───────────────┘    └──────────────────┘    └─────────────────────┘ │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Session configuration
//! - [`crypto`] - Key derivation and authenticated encryption
//! - [`protocol`] - Wire frames, the frame codec and the salt exchange
//! - [`transport`] - The transport capability and its implementations
//! - [`session`] - The state machine and the `ChatSession` facade
//! - [`messaging`] - The in-memory chat log
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SECURITY LAYERS                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Key:        PBKDF2-HMAC-SHA256(passphrase, salt, ≥120,000 iterations) │
//! │  Message:    AES-256-GCM, fresh random 96-bit nonce per message        │
//! │  Salt:       16 random bytes from the offerer, sent in the clear once  │
//! │  Signaling:  descriptors carry no key material                         │
//! │                                                                         │
//! │  Not provided: forward secrecy, replay protection, identity binding.   │
//! │  Security rests entirely on passphrase strength.                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod error;
pub mod messaging;
pub mod protocol;
pub mod session;
/// Wall-clock helpers for message timestamps.
pub mod time;
pub mod transport;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::{SessionConfig, UndecryptablePolicy};
pub use crypto::{CryptoProvider, Passphrase, SystemCrypto};
pub use error::{Error, Result};
pub use messaging::{Message, Origin};
pub use session::{ChatSession, Role, SessionEvent, SessionState};
pub use transport::{MemoryNetwork, MemoryTransport, PeerTransport, TcpTransport, TcpTransportConfig};

/// Returns the library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
