//! # Protocol Module
//!
//! What travels over the channel once it is open.
//!
//! ## Frame Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CHANNEL PROTOCOL                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Offerer                                         Answerer             │
//! │     │                                                │                  │
//! │     │  ── channel opens ──────────────────────────── │                  │
//! │     │                                                │                  │
//! │     │── Control { salt } ───────────────────────────►│  exactly once    │
//! │     │                                                │  (plaintext)     │
//! │     │                                                │                  │
//! │     │── Data { iv, data } ──────────────────────────►│  AES-256-GCM     │
//! │     │◄───────────────────────────── Data { iv, data }│                  │
//! │     │                                                │                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod codec;
mod frame;
mod salt_exchange;

pub use codec::FrameCodec;
pub use frame::{Frame, MAX_FRAME_SIZE};
pub use salt_exchange::{SaltExchange, SaltReceipt};
