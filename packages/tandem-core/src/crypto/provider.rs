//! # Crypto Provider
//!
//! The capability through which the session reaches randomness, the KDF
//! and the AEAD. Nothing else in the crate touches `OsRng` or the cipher
//! directly, so tests can swap in a deterministic provider.

use rand::rngs::OsRng;
use rand::RngCore;

use super::encryption::{self, Nonce, SessionKey};
use super::kdf::{self, KdfParams, Passphrase, Salt};
use crate::error::{Error, Result};

/// Random bytes, key derivation and authenticated encryption
pub trait CryptoProvider: Send + Sync + 'static {
    /// Fill `dest` with cryptographically secure random bytes
    fn fill_random(&self, dest: &mut [u8]) -> Result<()>;

    /// Derive the session key from the passphrase and salt
    fn derive_key(&self, passphrase: &Passphrase, salt: &Salt, params: &KdfParams)
        -> Result<SessionKey>;

    /// Seal `plaintext` under `key` and `nonce`, returning ciphertext and tag
    fn seal(&self, key: &SessionKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Open `ciphertext` (with tag) under `key` and `nonce`
    fn open(&self, key: &SessionKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Production provider: OS randomness, PBKDF2-HMAC-SHA256, AES-256-GCM
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCrypto;

impl CryptoProvider for SystemCrypto {
    fn fill_random(&self, dest: &mut [u8]) -> Result<()> {
        OsRng.try_fill_bytes(dest).map_err(|_| Error::RngFailed)
    }

    fn derive_key(
        &self,
        passphrase: &Passphrase,
        salt: &Salt,
        params: &KdfParams,
    ) -> Result<SessionKey> {
        Ok(kdf::derive_session_key(passphrase, salt, params))
    }

    fn seal(&self, key: &SessionKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        encryption::encrypt(key, nonce, plaintext)
    }

    fn open(&self, key: &SessionKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        encryption::decrypt(key, nonce, ciphertext)
    }
}

/// Generate a fresh session salt from the provider's randomness
pub fn generate_salt(crypto: &dyn CryptoProvider) -> Result<Salt> {
    let mut bytes = [0u8; kdf::SALT_SIZE];
    crypto.fill_random(&mut bytes)?;
    Ok(Salt::from_bytes(bytes))
}

/// Generate a fresh AEAD nonce from the provider's randomness
pub fn generate_nonce(crypto: &dyn CryptoProvider) -> Result<Nonce> {
    let mut bytes = [0u8; encryption::NONCE_SIZE];
    crypto.fill_random(&mut bytes)?;
    Ok(Nonce::from_bytes(bytes))
}
