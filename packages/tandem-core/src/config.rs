//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::{KdfParams, DEFAULT_ITERATIONS};
use crate::error::{Error, Result};

/// What to do with an inbound frame that cannot be opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndecryptablePolicy {
    /// Drop it, log a warning and emit an event
    #[default]
    Warn,
    /// Also append the raw frame text to the log, marked unverified
    ShowRaw,
}

/// Configuration for one chat session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// PBKDF2 iteration count; both peers must agree
    pub kdf_iterations: u32,
    /// How long `send` waits for the key and channel before `NotReady`
    pub send_timeout: Duration,
    /// Capacity of the facade → session command queue
    pub command_capacity: usize,
    /// Capacity of the event broadcast; slow subscribers lag past this
    pub event_capacity: usize,
    /// Handling of frames that fail authentication or parsing
    pub undecryptable: UndecryptablePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_ITERATIONS,
            send_timeout: Duration::from_secs(30),
            command_capacity: 64,
            event_capacity: 256,
            undecryptable: UndecryptablePolicy::Warn,
        }
    }
}

impl SessionConfig {
    /// Check the configuration before a session is started
    pub fn validate(&self) -> Result<()> {
        self.kdf_params()?;
        if self.send_timeout.is_zero() {
            return Err(Error::InvalidConfig("send_timeout must be non-zero".into()));
        }
        if self.command_capacity == 0 || self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "channel capacities must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// KDF parameters for this session
    pub fn kdf_params(&self) -> Result<KdfParams> {
        KdfParams::new(self.kdf_iterations)
    }
}
