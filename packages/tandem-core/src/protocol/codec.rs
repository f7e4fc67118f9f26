//! # Frame Codec
//!
//! Authenticated-encryption framing for individual chat messages.
//!
//! ```text
//!  seal_text("hello")                         open_frame(frame)
//!  ───────────────────                        ─────────────────
//!  nonce ← provider.fill_random(12)           nonce ← frame.iv (must be 12 bytes)
//!  ct    ← AES-256-GCM(key, nonce, "hello")   pt    ← AES-256-GCM⁻¹(key, nonce, frame.data)
//!  Frame::Data { iv: nonce, data: ct }        utf8(pt)
//! ```

use std::sync::Arc;

use super::frame::Frame;
use crate::crypto::{generate_nonce, CryptoProvider, Nonce, SessionKey};
use crate::error::{Error, Result};

/// Seals outbound text and opens inbound data frames
#[derive(Clone)]
pub struct FrameCodec {
    crypto: Arc<dyn CryptoProvider>,
}

impl FrameCodec {
    /// Create a codec on top of a crypto provider
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        Self { crypto }
    }

    /// Seal `plaintext` under a fresh random nonce
    ///
    /// Every call draws a new nonce, so sealing the same plaintext twice
    /// yields different nonces and different ciphertexts.
    pub fn seal(&self, key: &SessionKey, plaintext: &[u8]) -> Result<(Nonce, Vec<u8>)> {
        let nonce = generate_nonce(self.crypto.as_ref())?;
        let ciphertext = self.crypto.seal(key, &nonce, plaintext)?;
        Ok((nonce, ciphertext))
    }

    /// Open a sealed payload
    ///
    /// Fails with `AuthenticationFailed` when the tag does not verify. A
    /// failed open never yields plaintext.
    pub fn open(&self, key: &SessionKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.crypto.open(key, nonce, ciphertext)
    }

    /// Seal a chat message into a data frame
    pub fn seal_text(&self, key: &SessionKey, text: &str) -> Result<Frame> {
        let (nonce, ciphertext) = self.seal(key, text.as_bytes())?;
        Ok(Frame::data(&nonce, ciphertext))
    }

    /// Open a data frame back into chat text
    ///
    /// ## Errors
    ///
    /// - `ProtocolError` for a control frame, a nonce that is not 12 bytes,
    ///   or plaintext that is not UTF-8
    /// - `AuthenticationFailed` when the tag does not verify
    pub fn open_frame(&self, key: &SessionKey, frame: &Frame) -> Result<String> {
        let (iv, data) = match frame {
            Frame::Data { iv, data } => (iv, data),
            Frame::Control { .. } => {
                return Err(Error::ProtocolError(
                    "expected a data frame, got a control frame".into(),
                ))
            }
        };

        let nonce = Nonce::from_slice(iv)
            .map_err(|e| Error::ProtocolError(format!("bad data frame: {}", e)))?;
        let plaintext = self.open(key, &nonce, data)?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::ProtocolError("decrypted payload is not UTF-8".into()))
    }
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec").finish_non_exhaustive()
    }
}
