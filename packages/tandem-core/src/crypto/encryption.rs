//! # Encryption Module
//!
//! AES-256-GCM sealing for chat payloads.
//!
//! ## Per-Message Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE ENCRYPTION FLOW                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SessionKey (32 bytes, from PBKDF2)                                    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  Nonce: 12 fresh random bytes per message                    │       │
//! │  │  (Never reuse a nonce with the same key!)                   │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-256-GCM(key, nonce, utf8(text))                         │       │
//! │  │  → ciphertext || 16-byte tag                                 │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  Data frame { iv: nonce, data: ciphertext || tag }                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every message is sealed independently, so a lost or reordered frame
//! never desynchronizes the two peers.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce as AesNonce,
};
use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the session key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Domain string mixed into key fingerprints
const FINGERPRINT_DOMAIN: &[u8] = b"tandem-key-fingerprint-v1";

/// A nonce (number used once) for AES-GCM encryption
///
/// ## Critical Security Requirement
///
/// **NEVER reuse a nonce with the same key!**
///
/// Random 96-bit nonces are safe for up to 2^32 messages per key, far
/// beyond the length of a chat session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, rejecting any length other than 12
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; NONCE_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// The AES-256-GCM key shared by both peers for one session
///
/// Zeroized when dropped. Never serialized, never logged.
#[derive(ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short human-comparable fingerprint of the key
    ///
    /// Both peers display the same fingerprint exactly when they derived
    /// the same key, which lets users spot a passphrase mismatch before
    /// any message fails to decrypt. The fingerprint is a truncated
    /// SHA-256 over a domain string and the key, so it reveals nothing
    /// usable about the key itself.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(self.0);
        let digest = hasher.finalize();

        digest[..8]
            .chunks(2)
            .map(hex::encode)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// Encrypt a payload with AES-256-GCM under an explicit nonce
///
/// Returns `ciphertext || tag`. The caller is responsible for supplying a
/// fresh nonce; [`crate::protocol::FrameCodec::seal`] does this.
pub fn encrypt(key: &SessionKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    cipher
        .encrypt(AesNonce::from_slice(&nonce.0), plaintext)
        .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))
}

/// Decrypt `ciphertext || tag` with AES-256-GCM
///
/// ## Errors
///
/// Returns `AuthenticationFailed` if:
/// - The ciphertext was tampered with or truncated
/// - The key is wrong (different passphrase or salt)
/// - The nonce is wrong
pub fn decrypt(key: &SessionKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::AuthenticationFailed(format!(
            "ciphertext too short: {} bytes",
            ciphertext.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::AuthenticationFailed(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(AesNonce::from_slice(&nonce.0), ciphertext)
        .map_err(|_| Error::AuthenticationFailed("authentication tag mismatch".into()))
}

// ============================================================================
// TESTS
// ============================================================================
