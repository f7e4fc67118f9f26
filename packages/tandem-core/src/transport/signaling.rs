//! Signaling descriptors exchanged out-of-band.
//!
//! ## Signaling Flow
//!
//! 1. Alice creates an offer → JSON → base64 → pastes it to Bob
//! 2. Bob accepts it → creates an answer → pastes it back
//! 3. Alice finalizes with the answer → the channel opens
//!
//! The copy-paste path is untrusted and visible. Descriptors only carry
//! connection parameters, never key material.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound on a pasted descriptor, before decoding
const MAX_DESCRIPTOR_LEN: usize = 64 * 1024;

/// Which half of the handshake a descriptor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorKind {
    /// Produced by the offerer's `create_offer`
    Offer,
    /// Produced by the answerer's `create_answer`
    Answer,
}

impl std::fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorKind::Offer => f.write_str("offer"),
            DescriptorKind::Answer => f.write_str("answer"),
        }
    }
}

/// Connection parameters for one side of the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingData {
    /// Offer or answer
    pub kind: DescriptorKind,
    /// Transport-defined session identifier shared by offer and answer
    pub session: String,
    /// Transport-defined reachability candidates (addresses, relay hints)
    #[serde(default)]
    pub candidates: Vec<String>,
}

impl SignalingData {
    /// Build an offer descriptor
    pub fn offer(session: impl Into<String>, candidates: Vec<String>) -> Self {
        Self {
            kind: DescriptorKind::Offer,
            session: session.into(),
            candidates,
        }
    }

    /// Build an answer descriptor
    pub fn answer(session: impl Into<String>, candidates: Vec<String>) -> Self {
        Self {
            kind: DescriptorKind::Answer,
            session: session.into(),
            candidates,
        }
    }

    /// Text-safe export form: base64 of the JSON encoding
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Parse a pasted descriptor
    ///
    /// Surrounding whitespace is ignored. Any failure is a `ProtocolError`.
    pub fn decode(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::ProtocolError("descriptor is empty".into()));
        }
        if text.len() > MAX_DESCRIPTOR_LEN {
            return Err(Error::ProtocolError(format!(
                "descriptor too long: {} bytes",
                text.len()
            )));
        }

        let json = STANDARD.decode(text)?;
        let data: SignalingData = serde_json::from_slice(&json)
            .map_err(|e| Error::ProtocolError(format!("descriptor is not valid JSON: {}", e)))?;

        if data.session.trim().is_empty() {
            return Err(Error::ProtocolError("descriptor has no session id".into()));
        }
        Ok(data)
    }

    /// Parse a pasted descriptor and require a specific kind
    pub fn decode_expecting(text: &str, kind: DescriptorKind) -> Result<Self> {
        let data = Self::decode(text)?;
        if data.kind != kind {
            return Err(Error::ProtocolError(format!(
                "expected an {} descriptor, got an {}",
                kind, data.kind
            )));
        }
        Ok(data)
    }
}
