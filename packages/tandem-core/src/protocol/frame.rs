//! Wire frames exchanged over the open channel.
//!
//! ```text
//! Control (salt) frame:  { "salt": [16 bytes] }
//! Data frame:            { "iv": [12 bytes], "data": [ciphertext || tag] }
//! ```
//!
//! Byte arrays are JSON arrays of integers. The presence of `salt` is what
//! makes a frame a control frame.

use serde::{Deserialize, Serialize};

use crate::crypto::{Nonce, Salt};
use crate::error::{Error, Result};

/// Upper bound on an encoded frame, shared by every transport
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// A single frame on the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// Session salt, sent once by the offerer, never encrypted
    Control {
        /// Raw salt bytes
        salt: Vec<u8>,
    },
    /// One sealed chat message
    Data {
        /// AES-GCM nonce
        iv: Vec<u8>,
        /// Ciphertext with the authentication tag appended
        data: Vec<u8>,
    },
}

impl Frame {
    /// Control frame carrying `salt`
    pub fn control(salt: &Salt) -> Self {
        Frame::Control {
            salt: salt.as_bytes().to_vec(),
        }
    }

    /// Data frame carrying a sealed payload
    pub fn data(nonce: &Nonce, ciphertext: Vec<u8>) -> Self {
        Frame::Data {
            iv: nonce.as_bytes().to_vec(),
            data: ciphertext,
        }
    }

    /// Whether this is the salt control frame
    pub fn is_control(&self) -> bool {
        matches!(self, Frame::Control { .. })
    }

    /// Serialize to the JSON wire form
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(Error::ProtocolError(format!(
                "frame too large: {} bytes (max {})",
                bytes.len(),
                MAX_FRAME_SIZE
            )));
        }
        Ok(bytes)
    }

    /// Parse the JSON wire form
    ///
    /// Anything that is not a control or data frame is a `ProtocolError`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(Error::ProtocolError(format!(
                "frame too large: {} bytes (max {})",
                bytes.len(),
                MAX_FRAME_SIZE
            )));
        }
        serde_json::from_slice(bytes)
            .map_err(|e| Error::ProtocolError(format!("malformed frame: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_frame_wire_shape() {
        let salt = Salt::from_bytes([1u8; 16]);
        let encoded = Frame::control(&salt).encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(value["salt"].as_array().unwrap().len(), 16);
        assert!(value.get("iv").is_none());
    }

    #[test]
    fn test_data_frame_wire_shape() {
        let nonce = Nonce::from_bytes([2u8; 12]);
        let encoded = Frame::data(&nonce, vec![9, 8, 7]).encode().unwrap();

        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"{"iv":[2,2,2,2,2,2,2,2,2,2,2,2],"data":[9,8,7]}"#
        );
    }

    #[test]
    fn test_decode_reference_payloads() {
        let control = Frame::decode(br#"{"salt":[0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15]}"#).unwrap();
        assert!(control.is_control());

        let data = Frame::decode(br#"{"iv":[1,1,1,1,1,1,1,1,1,1,1,1],"data":[5]}"#).unwrap();
        assert_eq!(
            data,
            Frame::Data {
                iv: vec![1; 12],
                data: vec![5]
            }
        );
    }

    #[test]
    fn test_salt_field_wins() {
        // A frame carrying salt is a control frame even with extra fields.
        let frame = Frame::decode(br#"{"salt":[1],"iv":[1],"data":[1]}"#).unwrap();
        assert!(frame.is_control());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for raw in [&b"hello"[..], b"{}", br#"{"iv":[1]}"#, br#"{"data":"x","iv":[1]}"#, b""] {
            assert!(
                matches!(Frame::decode(raw), Err(Error::ProtocolError(_))),
                "accepted {:?}",
                String::from_utf8_lossy(raw)
            );
        }
    }
}
