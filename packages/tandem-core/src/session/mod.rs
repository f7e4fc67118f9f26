//! # Session Module
//!
//! [`ChatSession`] is the one object an application holds. It wraps a
//! background task that runs the state machine and exposes async calls for
//! each user action.
//!
//! ## Handshake
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SESSION ESTABLISHMENT                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Alice (offerer)                             Bob (answerer)           │
//! │   ───────────────                             ──────────────           │
//! │   D1 = create_offer()                                                  │
//! │        salt ← random(16), derive key                                   │
//! │                  ────── D1 (copy/paste) ──────►                        │
//! │                                               D2 = accept_offer(D1)    │
//! │                  ◄───── D2 (copy/paste) ───────                        │
//! │   finalize(D2)                                                         │
//! │                                                                         │
//! │   ═══════════════════ channel opens ═══════════════════                │
//! │                                                                         │
//! │   { salt } ─────────────────────────────────► store salt, derive key   │
//! │   send("hello") ── { iv, data } ────────────► log { peer, "hello" }    │
//! │   log { peer, "hi" } ◄──────── { iv, data } ─ send("hi")               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both sides must type the same passphrase. The key never leaves the
//! process and the descriptors carry no key material.
//!
//! ## Example
//!
//! ```ignore
//! use tandem_core::{ChatSession, MemoryNetwork, SessionConfig};
//!
//! let network = MemoryNetwork::new();
//! let alice = ChatSession::new("correct horse", network.transport(), SessionConfig::default())?;
//! let bob = ChatSession::new("correct horse", network.transport(), SessionConfig::default())?;
//!
//! let offer = alice.create_offer().await?;
//! let answer = bob.accept_offer(&offer).await?;
//! alice.finalize(&answer).await?;
//!
//! alice.send("hello").await?;
//! ```

mod events;
mod machine;
mod state;

pub use events::SessionEvent;
pub use state::{Role, SessionState};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::SessionConfig;
use crate::crypto::{CryptoProvider, Passphrase, SystemCrypto};
use crate::error::{Error, Result};
use crate::messaging::Message;
use crate::transport::PeerTransport;
use machine::{MachineInputs, SessionCommand, SessionMachine, SharedView};

/// Handle to one passphrase-encrypted chat session
///
/// Dropping the handle tears the session down.
pub struct ChatSession {
    command_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<SessionState>,
    event_tx: broadcast::Sender<SessionEvent>,
    shared: SharedView,
    config: SessionConfig,
}

impl ChatSession {
    /// Start a session over `transport` using the system crypto provider
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        passphrase: impl Into<Passphrase>,
        transport: impl PeerTransport,
        config: SessionConfig,
    ) -> Result<Self> {
        Self::with_crypto(passphrase, transport, config, Arc::new(SystemCrypto))
    }

    /// Start a session with an explicit crypto provider
    pub fn with_crypto(
        passphrase: impl Into<Passphrase>,
        transport: impl PeerTransport,
        config: SessionConfig,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let params = config.kdf_params()?;
        let passphrase = passphrase.into();
        if passphrase.is_empty() {
            return Err(Error::InvalidConfig("passphrase must not be empty".into()));
        }

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (key_tx, key_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let shared = SharedView::default();

        let mut transport: Box<dyn PeerTransport> = Box::new(transport);
        transport.attach(transport_tx);

        let machine = SessionMachine::new(
            transport,
            crypto,
            passphrase,
            params,
            config.undecryptable,
            key_tx,
            state_tx,
            event_tx.clone(),
            shared.clone(),
        );
        tokio::spawn(machine.run(MachineInputs {
            commands: command_rx,
            transport: transport_rx,
            keys: key_rx,
        }));

        Ok(Self {
            command_tx,
            state_rx,
            event_tx,
            shared,
            config,
        })
    }

    /// Begin the offerer flow
    ///
    /// Returns the descriptor to hand to the peer. Only valid while `Idle`.
    pub async fn create_offer(&self) -> Result<String> {
        self.request(|reply| SessionCommand::CreateOffer { reply }).await
    }

    /// Begin the answerer flow with the peer's offer
    ///
    /// Returns the answer descriptor to hand back. A malformed offer fails
    /// with `ProtocolError` and leaves the session `Idle`.
    pub async fn accept_offer(&self, descriptor: &str) -> Result<String> {
        let descriptor = descriptor.to_string();
        self.request(|reply| SessionCommand::AcceptOffer { descriptor, reply })
            .await
    }

    /// Complete the offerer flow with the peer's answer
    pub async fn finalize(&self, descriptor: &str) -> Result<()> {
        let descriptor = descriptor.to_string();
        self.request(|reply| SessionCommand::Finalize { descriptor, reply })
            .await
    }

    /// Encrypt and send one message
    ///
    /// If the channel or key is not ready yet the message waits, up to the
    /// configured send timeout, and then fails with `NotReady`. A send that
    /// times out is withdrawn and never transmitted later.
    pub async fn send(&self, text: &str) -> Result<Message> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Send {
                text: text.to_string(),
                reply,
            })
            .await
            .map_err(|_| Error::SessionClosed)?;

        match tokio::time::timeout(self.config.send_timeout, rx).await {
            Ok(result) => result.map_err(|_| Error::SessionClosed)?,
            Err(_) => Err(Error::NotReady(format!(
                "session not ready after {:?} (state: {})",
                self.config.send_timeout,
                self.status()
            ))),
        }
    }

    /// Snapshot of the chat log
    pub fn messages(&self) -> Vec<Message> {
        self.shared.log.read().entries().to_vec()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Current lifecycle state
    pub fn status(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Offerer or answerer, once the handshake has started
    pub fn role(&self) -> Option<Role> {
        *self.shared.role.read()
    }

    /// Wait until the state satisfies `predicate`
    ///
    /// Fails with `Timeout` if it does not happen within `timeout`.
    pub async fn wait_for_status<F>(&self, mut predicate: F, timeout: Duration) -> Result<SessionState>
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut rx = self.state_rx.clone();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|s| predicate(s))).await;
        match waited {
            Ok(Ok(state)) => Ok(*state),
            Ok(Err(_)) => Err(Error::SessionClosed),
            Err(_) => Err(Error::Timeout(format!(
                "state still {} after {:?}",
                self.status(),
                timeout
            ))),
        }
    }

    /// Tear the session down
    ///
    /// Closes the transport, discards the key and fails any queued sends.
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .command_tx
            .send(SessionCommand::Close { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> SessionCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(command(reply))
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("state", &self.status())
            .field("role", &self.role())
            .field("messages", &self.shared.log.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MIN_ITERATIONS;
    use crate::transport::{MemoryNetwork, SignalingData};

    fn config() -> SessionConfig {
        SessionConfig {
            kdf_iterations: MIN_ITERATIONS,
            send_timeout: Duration::from_secs(10),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let network = MemoryNetwork::new();
        let session = ChatSession::new("pw", network.transport(), config()).unwrap();

        assert_eq!(session.status(), SessionState::Idle);
        assert_eq!(session.role(), None);
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_empty_passphrase_rejected() {
        let network = MemoryNetwork::new();
        let result = ChatSession::new("", network.transport(), config());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_create_offer_moves_to_awaiting_answer() {
        let network = MemoryNetwork::new();
        let session = ChatSession::new("pw", network.transport(), config()).unwrap();

        let descriptor = session.create_offer().await.unwrap();
        assert!(SignalingData::decode(&descriptor).is_ok());
        assert_eq!(session.status(), SessionState::AwaitingAnswer);
        assert_eq!(session.role(), Some(Role::Offerer));
    }

    #[tokio::test]
    async fn test_second_offer_is_invalid_state() {
        let network = MemoryNetwork::new();
        let session = ChatSession::new("pw", network.transport(), config()).unwrap();
        session.create_offer().await.unwrap();

        assert!(matches!(
            session.create_offer().await,
            Err(Error::InvalidState(_))
        ));
        assert_eq!(session.status(), SessionState::AwaitingAnswer);
    }

    #[tokio::test]
    async fn test_finalize_before_offer_is_invalid_state() {
        let network = MemoryNetwork::new();
        let session = ChatSession::new("pw", network.transport(), config()).unwrap();

        let answer = SignalingData::answer("x", vec![]).encode().unwrap();
        assert!(matches!(
            session.finalize(&answer).await,
            Err(Error::InvalidState(_))
        ));
        assert_eq!(session.status(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_malformed_answer_keeps_state() {
        let network = MemoryNetwork::new();
        let session = ChatSession::new("pw", network.transport(), config()).unwrap();
        session.create_offer().await.unwrap();

        assert!(matches!(
            session.finalize("garbage").await,
            Err(Error::ProtocolError(_))
        ));
        assert_eq!(session.status(), SessionState::AwaitingAnswer);
    }

    #[tokio::test]
    async fn test_close_is_terminal_and_idempotent() {
        let network = MemoryNetwork::new();
        let session = ChatSession::new("pw", network.transport(), config()).unwrap();
        session.create_offer().await.unwrap();

        session.close().await;
        assert_eq!(session.status(), SessionState::Closed);
        session.close().await;

        assert!(matches!(
            session.create_offer().await,
            Err(Error::SessionClosed)
        ));
        assert!(matches!(session.send("late").await, Err(Error::SessionClosed)));
        assert_eq!(network.pending_offers(), 0);
    }

    #[tokio::test]
    async fn test_send_times_out_when_never_ready() {
        let network = MemoryNetwork::new();
        let session = ChatSession::new(
            "pw",
            network.transport(),
            SessionConfig {
                send_timeout: Duration::from_millis(50),
                ..config()
            },
        )
        .unwrap();

        assert!(matches!(session.send("hello?").await, Err(Error::NotReady(_))));
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_status_times_out() {
        let network = MemoryNetwork::new();
        let session = ChatSession::new("pw", network.transport(), config()).unwrap();

        let result = session
            .wait_for_status(|s| *s == SessionState::Open, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }
}
