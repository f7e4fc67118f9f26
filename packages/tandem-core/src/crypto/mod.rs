//! # Cryptography Module
//!
//! All cryptographic primitives used by Tandem Core.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────┐      ┌───────────────┐                              │
//! │  │  Passphrase   │      │     Salt      │  16 bytes, offerer-chosen   │
//! │  │ (both users)  │      │  (in-band)    │                              │
//! │  └───────┬───────┘      └───────┬───────┘                              │
//! │          └──────────┬───────────┘                                      │
//! │                     ▼                                                   │
//! │          ┌─────────────────────┐                                       │
//! │          │ PBKDF2-HMAC-SHA256  │  kdf.rs                               │
//! │          │   ≥ 120k rounds     │                                       │
//! │          └──────────┬──────────┘                                       │
//! │                     ▼                                                   │
//! │          ┌─────────────────────┐                                       │
//! │          │  SessionKey (256b)  │  zeroized on drop                     │
//! │          └──────────┬──────────┘                                       │
//! │                     ▼                                                   │
//! │          ┌─────────────────────┐                                       │
//! │          │    AES-256-GCM      │  encryption.rs                        │
//! │          │  random 96b nonce   │                                       │
//! │          └─────────────────────┘                                       │
//! │                                                                         │
//! │  provider.rs wraps all three behind the CryptoProvider trait.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Library Choices
//!
//! | Purpose | Library | Notes |
//! |---------|---------|-------|
//! | AEAD | `aes-gcm` | Pure Rust, audited |
//! | PBKDF2 | `ring` | Constant-time HMAC-SHA256 |
//! | Fingerprints | `sha2` | |
//! | Random | `rand` | OS entropy via `OsRng` |
//! | Zeroization | `zeroize` | Wipes keys and passphrases on drop |

mod encryption;
mod kdf;
mod provider;

pub use encryption::{decrypt, encrypt, Nonce, SessionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use kdf::{
    derive_session_key, KdfParams, Passphrase, Salt, DEFAULT_ITERATIONS, MIN_ITERATIONS,
    SALT_SIZE,
};
pub use provider::{generate_nonce, generate_salt, CryptoProvider, SystemCrypto};
