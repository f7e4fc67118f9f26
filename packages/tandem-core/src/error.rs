//! # Error Handling
//!
//! Error types for Tandem Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Crypto Errors (300)                                               │
//! │  │   ├── KeyDerivationFailed   - PBKDF2 could not produce a key        │
//! │  │   ├── EncryptionFailed      - AEAD seal failed                      │
//! │  │   ├── AuthenticationFailed  - AEAD tag did not verify               │
//! │  │   ├── InvalidKey            - Wrong key / salt / nonce length       │
//! │  │   └── RngFailed             - OS randomness unavailable             │
//! │  │                                                                      │
//! │  ├── Session Errors (400)                                              │
//! │  │   ├── InvalidState          - Operation not allowed in this state   │
//! │  │   ├── NotReady              - Key or channel not ready in time      │
//! │  │   ├── SessionClosed         - Session task is gone                  │
//! │  │   └── InvalidConfig         - Rejected configuration value          │
//! │  │                                                                      │
//! │  ├── Transport Errors (500)                                            │
//! │  │   ├── ProtocolError         - Malformed descriptor or frame         │
//! │  │   ├── TransportFailure      - Connectivity lost / never established │
//! │  │   └── Timeout               - Transport operation timed out         │
//! │  │                                                                      │
//! │  └── Internal Errors (900)                                             │
//! │      ├── Internal                                                      │
//! │      └── SerializationError                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Errors never escape a session as panics. The session task reports them
//! through its status channel and event stream; the facade returns them
//! from the call that caused them.

use thiserror::Error;

/// Result type alias for Tandem Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Tandem Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Key derivation failed
    #[error("Failed to derive session key: {0}")]
    KeyDerivationFailed(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// The AEAD tag did not verify (wrong passphrase, corruption, tampering)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid key, salt or nonce length
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Random number generation failed
    #[error("Random number generation failed")]
    RngFailed,

    // ========================================================================
    // Session Errors (400-499)
    // ========================================================================

    /// Operation is not allowed in the current session state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Key or channel did not become ready within the bounded wait
    #[error("Session not ready: {0}")]
    NotReady(String),

    /// The session task has shut down
    #[error("Session is closed.")]
    SessionClosed,

    /// A configuration value was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Transport Errors (500-599)
    // ========================================================================

    /// Malformed descriptor or frame
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Connectivity lost or never established
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Transport operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Numeric error code, grouped by domain:
    /// - 300-399: Crypto
    /// - 400-499: Session
    /// - 500-599: Transport
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::KeyDerivationFailed(_) => 300,
            Error::EncryptionFailed(_) => 301,
            Error::AuthenticationFailed(_) => 302,
            Error::InvalidKey(_) => 303,
            Error::RngFailed => 304,

            Error::InvalidState(_) => 400,
            Error::NotReady(_) => 401,
            Error::SessionClosed => 402,
            Error::InvalidConfig(_) => 403,

            Error::ProtocolError(_) => 500,
            Error::TransportFailure(_) => 501,
            Error::Timeout(_) => 502,

            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the session where it was; the user can
    /// retry the step (paste a corrected descriptor, send again later).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ProtocolError(_)
                | Error::NotReady(_)
                | Error::InvalidState(_)
                | Error::Timeout(_)
        )
    }

    /// Check if this error ends the session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::TransportFailure(_) | Error::SessionClosed)
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::ProtocolError(format!("descriptor is not valid base64: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::TransportFailure(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
