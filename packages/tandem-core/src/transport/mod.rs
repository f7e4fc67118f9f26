//! # Transport Module
//!
//! The PeerTransport capability consumed by the session, plus two
//! implementations.
//!
//! ## Transport Contract
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PEER TRANSPORT                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Session task                          PeerTransport                  │
//! │   ────────────                          ─────────────                  │
//! │   attach(events_tx)  ─────────────────► keeps the sender               │
//! │   create_offer()     ─────────────────► SignalingData (offer)          │
//! │   create_answer(o)   ─────────────────► SignalingData (answer)         │
//! │   accept_answer(a)   ─────────────────► connect                        │
//! │   send(bytes)        ─────────────────► ordered, reliable delivery     │
//! │   close()            ─────────────────► release everything             │
//! │                                                                         │
//! │   events_rx ◄─────────────────────────  Opened | Frame(bytes)          │
//! │                                         StateChanged | Closed | Failed │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transports never call back into the session. Everything they observe
//! is posted as a [`TransportEvent`] on the attached channel and drained
//! by the session task one event at a time.
//!
//! ## Implementations
//!
//! | Transport | Use |
//! |-----------|-----|
//! | [`MemoryTransport`] | In-process hub; tests and demos |
//! | [`TcpTransport`] | Direct TCP; offerer listens, answerer dials |

mod memory;
mod signaling;
mod tcp;

pub use memory::{FrameInterceptor, MemoryNetwork, MemoryTransport};
pub use signaling::{DescriptorKind, SignalingData};
pub use tcp::{TcpTransport, TcpTransportConfig};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Events posted by a transport to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open; frames may be sent
    Opened,
    /// A frame arrived from the peer
    Frame(Vec<u8>),
    /// Informational connectivity progress ("gathering", "connecting", ...)
    StateChanged(String),
    /// The peer closed the channel
    Closed,
    /// Connectivity failed
    Failed(String),
}

/// Sender half handed to a transport by [`PeerTransport::attach`]
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Connectivity capability consumed by the session state machine
#[async_trait]
pub trait PeerTransport: Send + 'static {
    /// Hand the transport the channel it posts events on
    ///
    /// Called once, before any other method.
    fn attach(&mut self, events: TransportEventSender);

    /// Produce a local offer
    async fn create_offer(&mut self) -> Result<SignalingData>;

    /// Accept a remote offer and produce a local answer
    async fn create_answer(&mut self, offer: &SignalingData) -> Result<SignalingData>;

    /// Finalize the connection with the remote answer
    ///
    /// Returns once the answer is applied; [`TransportEvent::Opened`]
    /// follows when the channel is usable.
    async fn accept_answer(&mut self, answer: &SignalingData) -> Result<()>;

    /// Send one frame
    async fn send(&mut self, frame: Vec<u8>) -> Result<()>;

    /// Release all resources; no events are posted afterwards
    async fn close(&mut self);
}

#[async_trait]
impl<T: PeerTransport + ?Sized> PeerTransport for Box<T> {
    fn attach(&mut self, events: TransportEventSender) {
        (**self).attach(events)
    }

    async fn create_offer(&mut self) -> Result<SignalingData> {
        (**self).create_offer().await
    }

    async fn create_answer(&mut self, offer: &SignalingData) -> Result<SignalingData> {
        (**self).create_answer(offer).await
    }

    async fn accept_answer(&mut self, answer: &SignalingData) -> Result<()> {
        (**self).accept_answer(answer).await
    }

    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        (**self).send(frame).await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}
