//! # Key Derivation
//!
//! Turns the shared passphrase and the session salt into the AES-256-GCM
//! session key.
//!
//! ## Derivation
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    PASSPHRASE → SESSION KEY                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Passphrase (typed by both users, never transmitted)                   │
//! │       │                                                                 │
//! │       │      Salt (16 random bytes, chosen by the offerer,             │
//! │       │            delivered in-band in the clear)                      │
//! │       │        │                                                        │
//! │       ▼        ▼                                                        │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  PBKDF2-HMAC-SHA256(                                            │   │
//! │  │    password   = utf8(passphrase),                              │   │
//! │  │    salt       = salt,                                          │   │
//! │  │    iterations = 120,000 (minimum),                             │   │
//! │  │  )                                                              │   │
//! │  │                                                                 │   │
//! │  │  → 32-byte AES-256-GCM key                                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! | Aspect | Choice |
//! |--------|--------|
//! | KDF | PBKDF2-HMAC-SHA256, deliberately slow |
//! | Work factor | ≥ 120,000 iterations, rejected below |
//! | Salt | 16 bytes, fresh per session, public |
//! | Key lifetime | Process memory only, zeroized on drop |
//!
//! The salt travels in the clear, so the only thing standing between an
//! onlooker and the session key is the passphrase's entropy multiplied by
//! the iteration count.

use std::num::NonZeroU32;

use ring::pbkdf2;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::encryption::{SessionKey, KEY_SIZE};
use crate::error::{Error, Result};

/// Size of the session salt in bytes
pub const SALT_SIZE: usize = 16;

/// Lowest iteration count accepted
pub const MIN_ITERATIONS: u32 = 120_000;

/// Iteration count used unless configured otherwise
pub const DEFAULT_ITERATIONS: u32 = 120_000;

const DEFAULT_ITERATIONS_NZ: NonZeroU32 = match NonZeroU32::new(DEFAULT_ITERATIONS) {
    Some(n) => n,
    None => panic!("DEFAULT_ITERATIONS must be non-zero"),
};

/// The per-session salt
///
/// Not secret, only unique per session. Generated once by the offerer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, rejecting any length other than 16
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; SALT_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "salt must be {} bytes, got {}",
                SALT_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Salt([{} bytes])", SALT_SIZE)
    }
}

/// The locally entered passphrase
///
/// Zeroized when dropped; `Debug` never prints it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(String);

impl Passphrase {
    /// Wrap a passphrase
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(passphrase.into())
    }

    /// UTF-8 bytes fed to the KDF
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Whether the passphrase is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// PBKDF2 work factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: NonZeroU32,
}

impl KdfParams {
    /// Build parameters, rejecting iteration counts below [`MIN_ITERATIONS`]
    pub fn new(iterations: u32) -> Result<Self> {
        NonZeroU32::new(iterations)
            .filter(|n| n.get() >= MIN_ITERATIONS)
            .map(|iterations| Self { iterations })
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "KDF iterations must be at least {}, got {}",
                    MIN_ITERATIONS, iterations
                ))
            })
    }

    /// The configured iteration count
    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS_NZ,
        }
    }
}

/// Derive the session key from a passphrase and salt
///
/// Pure and deterministic: identical inputs always yield bit-identical
/// keys on both peers. CPU-bound; callers on an async runtime should run
/// it on a blocking worker.
pub fn derive_session_key(passphrase: &Passphrase, salt: &Salt, params: &KdfParams) -> SessionKey {
    let mut out = [0u8; KEY_SIZE];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        params.iterations,
        salt.as_bytes(),
        passphrase.as_bytes(),
        &mut out,
    );

    let key = SessionKey::from_bytes(out);
    out.zeroize();
    key
}

// ============================================================================
// TESTS
// ============================================================================
