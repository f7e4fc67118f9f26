//! In-process transport over a shared hub.
//!
//! Two [`MemoryTransport`]s built from clones of the same [`MemoryNetwork`]
//! behave like a pair of peers: the offer registers a slot on the hub, the
//! answer claims it, and accepting the answer opens the link for both.
//! Delivery is ordered and reliable, the same guarantee a real data channel
//! gives once open.
//!
//! A [`FrameInterceptor`] on the hub sees every frame in flight and may
//! rewrite or drop it, which is how tests model tampering and loss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{PeerTransport, SignalingData, TransportEvent, TransportEventSender};
use crate::error::{Error, Result};

/// Hook applied to every frame in flight; `None` drops the frame
pub type FrameInterceptor = Arc<dyn Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync>;

/// A pending offer waiting for its answer
struct OfferSlot {
    offerer: TransportEventSender,
    answerer: Option<TransportEventSender>,
    link_open: Arc<AtomicBool>,
}

#[derive(Default)]
struct NetworkInner {
    offers: HashMap<String, OfferSlot>,
    interceptor: Option<FrameInterceptor>,
}

/// Shared hub connecting memory transports
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl MemoryNetwork {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport attached to this hub
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport::new(self.clone())
    }

    /// Install a hook applied to every frame in flight
    pub fn set_interceptor(&self, interceptor: FrameInterceptor) {
        self.inner.lock().interceptor = Some(interceptor);
    }

    /// Number of offers still waiting for an answer or finalization
    pub fn pending_offers(&self) -> usize {
        self.inner.lock().offers.len()
    }

    fn intercept(&self, frame: Vec<u8>) -> Option<Vec<u8>> {
        let interceptor = self.inner.lock().interceptor.clone();
        match interceptor {
            Some(hook) => hook(frame),
            None => Some(frame),
        }
    }
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("pending_offers", &self.pending_offers())
            .finish()
    }
}

/// One end of an in-process link
pub struct MemoryTransport {
    network: MemoryNetwork,
    events: Option<TransportEventSender>,
    session: Option<String>,
    peer: Option<TransportEventSender>,
    link_open: Arc<AtomicBool>,
    closed: bool,
}

impl MemoryTransport {
    /// Create a transport on `network`
    pub fn new(network: MemoryNetwork) -> Self {
        Self {
            network,
            events: None,
            session: None,
            peer: None,
            link_open: Arc::new(AtomicBool::new(false)),
            closed: false,
        }
    }

    fn events(&self) -> Result<&TransportEventSender> {
        self.events
            .as_ref()
            .ok_or_else(|| Error::Internal("memory transport used before attach".into()))
    }

    fn post(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    fn attach(&mut self, events: TransportEventSender) {
        self.events = Some(events);
    }

    async fn create_offer(&mut self) -> Result<SignalingData> {
        let offerer = self.events()?.clone();
        let session = uuid::Uuid::new_v4().to_string();

        self.network.inner.lock().offers.insert(
            session.clone(),
            OfferSlot {
                offerer,
                answerer: None,
                link_open: Arc::clone(&self.link_open),
            },
        );
        self.session = Some(session.clone());
        self.post(TransportEvent::StateChanged("have-local-offer".into()));

        tracing::debug!(session = %session, "Memory offer registered");
        Ok(SignalingData::offer(
            session.clone(),
            vec![format!("memory://{}", session)],
        ))
    }

    async fn create_answer(&mut self, offer: &SignalingData) -> Result<SignalingData> {
        let answerer = self.events()?.clone();

        {
            let mut inner = self.network.inner.lock();
            let slot = inner.offers.get_mut(&offer.session).ok_or_else(|| {
                Error::TransportFailure(format!("no pending offer for session {}", offer.session))
            })?;
            if slot.answerer.is_some() {
                return Err(Error::TransportFailure(
                    "offer has already been answered".into(),
                ));
            }
            slot.answerer = Some(answerer);
            self.peer = Some(slot.offerer.clone());
            self.link_open = Arc::clone(&slot.link_open);
        }

        self.session = Some(offer.session.clone());
        self.post(TransportEvent::StateChanged("have-remote-offer".into()));

        tracing::debug!(session = %offer.session, "Memory offer answered");
        Ok(SignalingData::answer(offer.session.clone(), vec![]))
    }

    async fn accept_answer(&mut self, answer: &SignalingData) -> Result<()> {
        if self.session.as_deref() != Some(answer.session.as_str()) {
            return Err(Error::ProtocolError(
                "answer does not belong to this offer".into(),
            ));
        }

        let slot = {
            let mut inner = self.network.inner.lock();
            match inner.offers.get(&answer.session) {
                Some(slot) if slot.answerer.is_some() => inner.offers.remove(&answer.session),
                Some(_) => None,
                None => {
                    return Err(Error::TransportFailure(
                        "offer is no longer pending".into(),
                    ))
                }
            }
        };
        let slot = slot.ok_or_else(|| {
            Error::TransportFailure("the answering peer never claimed this offer".into())
        })?;
        let answerer = slot.answerer.ok_or_else(|| {
            Error::Internal("answered offer slot without answerer".into())
        })?;

        self.link_open.store(true, Ordering::SeqCst);
        self.peer = Some(answerer.clone());

        let _ = answerer.send(TransportEvent::StateChanged("connected".into()));
        let _ = answerer.send(TransportEvent::Opened);
        self.post(TransportEvent::StateChanged("connected".into()));
        self.post(TransportEvent::Opened);

        tracing::debug!(session = %answer.session, "Memory link open");
        Ok(())
    }

    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        if self.closed || !self.link_open.load(Ordering::SeqCst) {
            return Err(Error::TransportFailure("memory channel is not open".into()));
        }
        let peer = self
            .peer
            .as_ref()
            .ok_or_else(|| Error::TransportFailure("memory channel has no peer".into()))?;

        let Some(frame) = self.network.intercept(frame) else {
            tracing::debug!("Frame dropped by interceptor");
            return Ok(());
        };

        peer.send(TransportEvent::Frame(frame))
            .map_err(|_| Error::TransportFailure("peer endpoint is gone".into()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(session) = &self.session {
            self.network.inner.lock().offers.remove(session);
        }
        if self.link_open.swap(false, Ordering::SeqCst) {
            if let Some(peer) = &self.peer {
                let _ = peer.send(TransportEvent::Closed);
            }
        }
        self.peer = None;
        self.events = None;
    }
}
