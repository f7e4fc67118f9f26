//! # Session State Machine
//!
//! The task that owns one session's protocol state.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SESSION TASK                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────┐                  ┌─────────────────────────────┐  │
//! │  │ SessionCommand   │─────────────────►│                             │  │
//! │  │ (from facade)    │                  │  tokio::select! {           │  │
//! │  └──────────────────┘                  │    cmd   = commands.recv()  │  │
//! │  ┌──────────────────┐                  │    event = transport.recv() │  │
//! │  │ TransportEvent   │─────────────────►│    key   = kdf.recv()       │  │
//! │  │ (from transport) │                  │  }                          │  │
//! │  └──────────────────┘                  │                             │  │
//! │  ┌──────────────────┐                  │  owns: transport, salt,     │  │
//! │  │ derived key      │─────────────────►│  key, pending queues        │  │
//! │  │ (spawn_blocking) │                  └──────────────┬──────────────┘  │
//! │  └──────────────────┘                                 │                 │
//! │                                                       ▼                 │
//! │                                 watch<SessionState> + broadcast<Event>  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation happens inside one branch of the loop, so a frame that
//! arrives while the key is still being derived is queued, never raced.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::events::SessionEvent;
use super::state::{Role, SessionState};
use crate::config::UndecryptablePolicy;
use crate::crypto::{generate_salt, CryptoProvider, KdfParams, Passphrase, Salt, SessionKey};
use crate::error::{Error, Result};
use crate::messaging::{Message, MessageLog};
use crate::protocol::{Frame, FrameCodec, SaltExchange, SaltReceipt};
use crate::transport::{DescriptorKind, PeerTransport, SignalingData, TransportEvent};

// ============================================================================
// COMMANDS
// ============================================================================

/// Requests from the facade to the session task
pub(crate) enum SessionCommand {
    /// Start the offerer flow
    CreateOffer {
        reply: oneshot::Sender<Result<String>>,
    },
    /// Start the answerer flow with a pasted offer
    AcceptOffer {
        descriptor: String,
        reply: oneshot::Sender<Result<String>>,
    },
    /// Complete the offerer flow with a pasted answer
    Finalize {
        descriptor: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Send one chat message, now or once the session is ready
    Send {
        text: String,
        reply: oneshot::Sender<Result<Message>>,
    },
    /// Tear the session down
    Close { reply: oneshot::Sender<()> },
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateOffer { .. } => write!(f, "CreateOffer"),
            Self::AcceptOffer { descriptor, .. } => f
                .debug_struct("AcceptOffer")
                .field("descriptor_len", &descriptor.len())
                .finish(),
            Self::Finalize { descriptor, .. } => f
                .debug_struct("Finalize")
                .field("descriptor_len", &descriptor.len())
                .finish(),
            Self::Send { text, .. } => f
                .debug_struct("Send")
                .field("text_len", &text.len())
                .finish(),
            Self::Close { .. } => write!(f, "Close"),
        }
    }
}

/// A send waiting for the key and channel
struct PendingSend {
    text: String,
    reply: oneshot::Sender<Result<Message>>,
}

/// Why an inbound frame produced no authenticated message
#[derive(Debug, Clone, Copy)]
enum Rejection {
    Authentication,
    Malformed,
}

/// State shared read-only with the facade
#[derive(Clone, Default)]
pub(crate) struct SharedView {
    pub log: Arc<RwLock<MessageLog>>,
    pub role: Arc<RwLock<Option<Role>>>,
}

// ============================================================================
// MACHINE
// ============================================================================

pub(crate) struct SessionMachine {
    transport: Box<dyn PeerTransport>,
    crypto: Arc<dyn CryptoProvider>,
    codec: FrameCodec,
    passphrase: Passphrase,
    params: KdfParams,
    policy: UndecryptablePolicy,

    state: SessionState,
    role: Option<Role>,
    salt: Option<SaltExchange>,
    key: Option<SessionKey>,
    channel_open: bool,
    deriving: bool,
    pending_sends: VecDeque<PendingSend>,
    pending_inbound: VecDeque<(Frame, Vec<u8>)>,

    key_tx: mpsc::UnboundedSender<Result<SessionKey>>,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    shared: SharedView,
}

/// Receivers drained by [`SessionMachine::run`]
pub(crate) struct MachineInputs {
    pub commands: mpsc::Receiver<SessionCommand>,
    pub transport: mpsc::UnboundedReceiver<TransportEvent>,
    pub keys: mpsc::UnboundedReceiver<Result<SessionKey>>,
}

impl SessionMachine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Box<dyn PeerTransport>,
        crypto: Arc<dyn CryptoProvider>,
        passphrase: Passphrase,
        params: KdfParams,
        policy: UndecryptablePolicy,
        key_tx: mpsc::UnboundedSender<Result<SessionKey>>,
        state_tx: watch::Sender<SessionState>,
        events: broadcast::Sender<SessionEvent>,
        shared: SharedView,
    ) -> Self {
        Self {
            transport,
            codec: FrameCodec::new(Arc::clone(&crypto)),
            crypto,
            passphrase,
            params,
            policy,
            state: SessionState::Idle,
            role: None,
            salt: None,
            key: None,
            channel_open: false,
            deriving: false,
            pending_sends: VecDeque::new(),
            pending_inbound: VecDeque::new(),
            key_tx,
            state_tx,
            events,
            shared,
        }
    }

    /// Drive the session until it is closed or the facade is dropped
    pub(crate) async fn run(mut self, inputs: MachineInputs) {
        let MachineInputs {
            mut commands,
            transport: mut transport_rx,
            keys: mut key_rx,
        } = inputs;

        tracing::debug!("Session task started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Close { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = transport_rx.recv() => {
                    self.handle_transport_event(event).await;
                }
                Some(result) = key_rx.recv() => {
                    self.handle_derived_key(result).await;
                }
            }
        }

        tracing::debug!(state = %self.state, "Session task stopped");
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, command: SessionCommand) {
        tracing::debug!(?command, state = %self.state, "Session command");

        match command {
            SessionCommand::CreateOffer { reply } => {
                let result = self.create_offer().await;
                let _ = reply.send(result);
            }
            SessionCommand::AcceptOffer { descriptor, reply } => {
                let result = self.accept_offer(&descriptor).await;
                let _ = reply.send(result);
            }
            SessionCommand::Finalize { descriptor, reply } => {
                let result = self.finalize(&descriptor).await;
                let _ = reply.send(result);
            }
            SessionCommand::Send { text, reply } => self.send(text, reply).await,
            SessionCommand::Close { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
            }
        }
    }

    async fn create_offer(&mut self) -> Result<String> {
        self.require(&[SessionState::Idle], "create_offer")?;

        let salt = generate_salt(self.crypto.as_ref())?;
        self.set_role(Role::Offerer);
        self.salt = Some(SaltExchange::offerer(salt));
        self.start_derivation(salt);
        self.transition(SessionState::Offering);

        let exported = self
            .transport
            .create_offer()
            .await
            .and_then(|offer| offer.encode());
        match exported {
            Ok(descriptor) => {
                self.transition(SessionState::AwaitingAnswer);
                self.emit(SessionEvent::LocalDescriptor {
                    descriptor: descriptor.clone(),
                });
                Ok(descriptor)
            }
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn accept_offer(&mut self, descriptor: &str) -> Result<String> {
        self.require(&[SessionState::Idle], "accept_offer")?;
        let offer = SignalingData::decode_expecting(descriptor, DescriptorKind::Offer)?;

        self.set_role(Role::Answerer);
        self.salt = Some(SaltExchange::answerer());
        self.transition(SessionState::Answering);

        let exported = self
            .transport
            .create_answer(&offer)
            .await
            .and_then(|answer| answer.encode());
        match exported {
            Ok(descriptor) => {
                self.transition(SessionState::Connecting);
                self.emit(SessionEvent::LocalDescriptor {
                    descriptor: descriptor.clone(),
                });
                Ok(descriptor)
            }
            Err(e @ Error::ProtocolError(_)) => {
                // The offer parsed but the transport could not use it
                self.role = None;
                *self.shared.role.write() = None;
                self.salt = None;
                self.transition(SessionState::Idle);
                Err(e)
            }
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn finalize(&mut self, descriptor: &str) -> Result<()> {
        self.require(
            &[SessionState::Offering, SessionState::AwaitingAnswer],
            "finalize",
        )?;
        let answer = SignalingData::decode_expecting(descriptor, DescriptorKind::Answer)?;

        match self.transport.accept_answer(&answer).await {
            Ok(()) => {
                self.transition(SessionState::Connecting);
                Ok(())
            }
            Err(e @ Error::ProtocolError(_)) => Err(e),
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn send(&mut self, text: String, reply: oneshot::Sender<Result<Message>>) {
        if self.state.is_terminal() {
            let _ = reply.send(Err(Error::SessionClosed));
            return;
        }

        if self.is_ready() {
            self.transmit(text, reply).await;
        } else {
            tracing::debug!(
                state = %self.state,
                has_key = self.key.is_some(),
                "Deferring send until the session is ready"
            );
            self.pending_sends.retain(|pending| !pending.reply.is_closed());
            self.pending_sends.push_back(PendingSend { text, reply });
        }
    }

    fn require(&self, allowed: &[SessionState], operation: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "{} is not allowed while {}",
                operation, self.state
            )))
        }
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    fn is_ready(&self) -> bool {
        self.state == SessionState::Open && self.channel_open && self.key.is_some()
    }

    async fn transmit(&mut self, text: String, reply: oneshot::Sender<Result<Message>>) {
        let Some(key) = self.key.as_ref() else {
            let _ = reply.send(Err(Error::NotReady("session key is not derived".into())));
            return;
        };

        let sealed = self.codec.seal_text(key, &text).and_then(|frame| frame.encode());
        let bytes = match sealed {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to seal outbound message");
                let _ = reply.send(Err(e));
                return;
            }
        };

        if reply.is_closed() {
            tracing::debug!("Dropping send withdrawn by its caller");
            return;
        }

        let len = bytes.len();
        match self.transport.send(bytes).await {
            Ok(()) => {
                tracing::debug!(len, "Sent data frame");
                let message = Message::local(text);
                self.shared.log.write().append(message.clone());
                self.emit(SessionEvent::MessageSent(message.clone()));
                let _ = reply.send(Ok(message));
            }
            Err(e) => {
                let _ = reply.send(Err(Error::TransportFailure(e.to_string())));
                self.fail(&e).await;
            }
        }
    }

    async fn flush_pending_sends(&mut self) {
        while self.is_ready() {
            let Some(pending) = self.pending_sends.pop_front() else {
                break;
            };
            self.transmit(pending.text, pending.reply).await;
        }
    }

    // ------------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------------

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.state.is_terminal() {
            return;
        }

        match event {
            TransportEvent::Opened => self.on_channel_open().await,
            TransportEvent::Frame(bytes) => self.on_frame(bytes),
            TransportEvent::StateChanged(detail) => {
                tracing::debug!(detail = %detail, "Transport status");
                self.emit(SessionEvent::TransportStatus { detail });
            }
            TransportEvent::Closed => self.on_channel_closed().await,
            TransportEvent::Failed(reason) => {
                self.fail(&Error::TransportFailure(reason)).await;
            }
        }

        // Inbound handling never awaits, so pending sends are retried here
        self.flush_pending_sends().await;
    }

    async fn on_channel_open(&mut self) {
        if !matches!(
            self.state,
            SessionState::Connecting | SessionState::Answering
        ) {
            tracing::warn!(state = %self.state, "Ignoring channel open outside the handshake");
            return;
        }
        self.channel_open = true;
        self.transition(SessionState::Open);

        let outbound = self.salt.as_mut().and_then(SaltExchange::take_outbound);
        if let Some(frame) = outbound {
            let sent = match frame.encode() {
                Ok(bytes) => self.transport.send(bytes).await,
                Err(e) => Err(e),
            };
            match sent {
                Ok(()) => {
                    tracing::info!("Salt sent to peer");
                    self.emit(SessionEvent::SaltDelivered);
                }
                Err(e) => self.fail(&e).await,
            }
        }
    }

    async fn on_channel_closed(&mut self) {
        if self.state != SessionState::Open {
            self.fail(&Error::TransportFailure(
                "channel closed before it opened".into(),
            ))
            .await;
            return;
        }

        let salt_missing = self.role == Some(Role::Answerer)
            && !self.salt.as_ref().map(SaltExchange::is_delivered).unwrap_or(false);
        if salt_missing {
            let error = Error::TransportFailure("channel closed; salt never delivered".into());
            tracing::error!(code = error.code(), "{}", error);
            self.emit(SessionEvent::Error {
                code: error.code(),
                message: error.to_string(),
            });
        }

        tracing::info!("Peer closed the channel");
        self.transition(SessionState::Closed);
        self.release().await;
    }

    fn on_frame(&mut self, bytes: Vec<u8>) {
        let frame = match Frame::decode(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                self.reject(&bytes, Rejection::Malformed, e.to_string());
                return;
            }
        };

        match frame {
            Frame::Control { salt } => self.on_salt(&salt),
            data => {
                if self.key.is_some() {
                    self.deliver(&data, &bytes);
                } else if self.deriving {
                    tracing::debug!("Key not ready; buffering data frame");
                    self.pending_inbound.push_back((data, bytes));
                } else {
                    self.reject(
                        &bytes,
                        Rejection::Authentication,
                        "no session key: salt not received".into(),
                    );
                }
            }
        }
    }

    fn on_salt(&mut self, bytes: &[u8]) {
        let Some(exchange) = self.salt.as_mut() else {
            tracing::warn!("Ignoring salt received before the handshake started");
            return;
        };

        match exchange.receive(bytes) {
            Ok(SaltReceipt::Stored(salt)) => {
                tracing::info!("Salt received from peer");
                self.start_derivation(salt);
                self.emit(SessionEvent::SaltDelivered);
            }
            Ok(SaltReceipt::Duplicate) => tracing::warn!("Ignoring repeated salt"),
            Ok(SaltReceipt::Unexpected) => tracing::warn!("Ignoring salt sent to the offerer"),
            Err(e) => {
                tracing::warn!(error = %e, "Rejected malformed salt");
                self.emit(SessionEvent::FrameRejected {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn deliver(&mut self, frame: &Frame, raw: &[u8]) {
        let Some(key) = self.key.as_ref() else {
            return;
        };

        match self.codec.open_frame(key, frame) {
            Ok(text) => {
                tracing::debug!(len = raw.len(), "Received data frame");
                let message = Message::peer(text);
                self.shared.log.write().append(message.clone());
                self.emit(SessionEvent::MessageReceived(message));
            }
            Err(Error::AuthenticationFailed(reason)) => {
                self.reject(raw, Rejection::Authentication, reason)
            }
            Err(e) => self.reject(raw, Rejection::Malformed, e.to_string()),
        }
    }

    fn reject(&mut self, raw: &[u8], kind: Rejection, reason: String) {
        match kind {
            Rejection::Authentication => {
                tracing::warn!(
                    reason = %reason,
                    "Inbound message failed authentication; passphrases may not match"
                );
                self.emit(SessionEvent::AuthenticationFailed { reason });
            }
            Rejection::Malformed => {
                tracing::warn!(reason = %reason, len = raw.len(), "Rejected malformed frame");
                self.emit(SessionEvent::FrameRejected { reason });
            }
        }

        if self.policy == UndecryptablePolicy::ShowRaw {
            let message = Message::unverified_peer(String::from_utf8_lossy(raw).into_owned());
            self.shared.log.write().append(message.clone());
            self.emit(SessionEvent::MessageReceived(message));
        }
    }

    // ------------------------------------------------------------------------
    // Key derivation
    // ------------------------------------------------------------------------

    fn start_derivation(&mut self, salt: Salt) {
        self.deriving = true;

        let crypto = Arc::clone(&self.crypto);
        let passphrase = self.passphrase.clone();
        let params = self.params;
        let key_tx = self.key_tx.clone();

        let derivation =
            tokio::task::spawn_blocking(move || crypto.derive_key(&passphrase, &salt, &params));
        tokio::spawn(async move {
            let result = derivation
                .await
                .unwrap_or_else(|e| Err(Error::KeyDerivationFailed(e.to_string())));
            let _ = key_tx.send(result);
        });
    }

    async fn handle_derived_key(&mut self, result: Result<SessionKey>) {
        self.deriving = false;

        let key = match result {
            Ok(key) => key,
            Err(e) => {
                self.fail(&e).await;
                return;
            }
        };
        if self.state.is_terminal() {
            return;
        }

        let fingerprint = key.fingerprint();
        tracing::info!(fingerprint = %fingerprint, "Session key ready");
        self.key = Some(key);
        self.emit(SessionEvent::KeyReady { fingerprint });

        while let Some((frame, raw)) = self.pending_inbound.pop_front() {
            self.deliver(&frame, &raw);
        }
        self.flush_pending_sends().await;
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    fn set_role(&mut self, role: Role) {
        self.role = Some(role);
        *self.shared.role.write() = Some(role);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        tracing::info!(from = %self.state, to = %next, "Session state changed");
        self.state = next;
        self.state_tx.send_replace(next);
        self.emit(SessionEvent::StatusChanged { state: next });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn fail(&mut self, error: &Error) {
        if self.state.is_terminal() {
            return;
        }
        tracing::error!(code = error.code(), error = %error, "Session failed");
        self.emit(SessionEvent::Error {
            code: error.code(),
            message: error.to_string(),
        });
        self.transition(SessionState::Failed);
        self.release().await;
    }

    async fn shutdown(&mut self) {
        if !self.state.is_terminal() {
            self.transition(SessionState::Closed);
        }
        self.release().await;
    }

    /// Drop the transport, the key and everything still queued
    async fn release(&mut self) {
        self.transport.close().await;
        self.channel_open = false;
        self.key = None;
        self.pending_inbound.clear();

        for pending in self.pending_sends.drain(..) {
            let _ = pending.reply.send(Err(Error::TransportFailure(
                "session ended before the message was sent".into(),
            )));
        }
    }
}
