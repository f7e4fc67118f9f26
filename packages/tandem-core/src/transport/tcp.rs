//! Direct TCP transport.
//!
//! ```text
//!   Offerer                                        Answerer
//!   ───────                                        ────────
//!   create_offer: bind listener
//!                 offer { session: token,
//!                         candidates: [addr] } ──► create_answer: dial candidates
//!                                                                 send hello(token)
//!   accept_answer: check token              ◄──── answer { session: token }
//!                  accept, verify hello
//!        │                                              │
//!        └────────── [u32 BE length][frame bytes] ──────┘
//! ```
//!
//! Every frame, including the hello, is a 4-byte big-endian length
//! followed by that many bytes, capped at [`MAX_FRAME_SIZE`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};

use super::{PeerTransport, SignalingData, TransportEvent, TransportEventSender};
use crate::error::{Error, Result};
use crate::protocol::MAX_FRAME_SIZE;

/// How long the offerer waits for the hello after accepting a socket
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP transport settings
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Address the offerer listens on
    pub bind_addr: SocketAddr,
    /// Addresses advertised in the offer instead of the bound address
    pub advertise: Vec<String>,
    /// Per-candidate connect timeout on the answerer
    pub connect_timeout: Duration,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            advertise: Vec::new(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

type SharedWriter = Arc<Mutex<Option<OwnedWriteHalf>>>;

/// Transport over one direct TCP connection
pub struct TcpTransport {
    config: TcpTransportConfig,
    events: Option<TransportEventSender>,
    token: Option<String>,
    listener: Option<TcpListener>,
    writer: SharedWriter,
    tasks: Vec<JoinHandle<()>>,
}

impl TcpTransport {
    /// Create a transport with the given settings
    pub fn new(config: TcpTransportConfig) -> Self {
        Self {
            config,
            events: None,
            token: None,
            listener: None,
            writer: Arc::new(Mutex::new(None)),
            tasks: Vec::new(),
        }
    }

    fn events(&self) -> Result<TransportEventSender> {
        self.events
            .clone()
            .ok_or_else(|| Error::Internal("tcp transport used before attach".into()))
    }

    fn post(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(TcpTransportConfig::default())
    }
}

#[async_trait]
impl PeerTransport for TcpTransport {
    fn attach(&mut self, events: TransportEventSender) {
        self.events = Some(events);
    }

    async fn create_offer(&mut self) -> Result<SignalingData> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local = listener.local_addr()?;

        let candidates = if self.config.advertise.is_empty() {
            let reachable = if local.ip().is_unspecified() {
                tracing::warn!(
                    bound = %local,
                    "Listening on an unspecified address; advertising loopback only"
                );
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port())
            } else {
                local
            };
            vec![reachable.to_string()]
        } else {
            self.config.advertise.clone()
        };

        let token = new_token();
        self.token = Some(token.clone());
        self.listener = Some(listener);
        self.post(TransportEvent::StateChanged(format!("listening on {}", local)));

        tracing::info!(bound = %local, "TCP offer ready");
        Ok(SignalingData::offer(token, candidates))
    }

    async fn create_answer(&mut self, offer: &SignalingData) -> Result<SignalingData> {
        let events = self.events()?;

        let addrs: Vec<SocketAddr> = offer
            .candidates
            .iter()
            .filter_map(|c| c.parse().ok())
            .collect();
        if addrs.is_empty() {
            return Err(Error::ProtocolError(
                "offer carries no usable TCP address".into(),
            ));
        }

        let mut stream = None;
        for addr in &addrs {
            self.post(TransportEvent::StateChanged(format!("connecting to {}", addr)));
            match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await
            {
                Ok(Ok(s)) => {
                    stream = Some(s);
                    break;
                }
                Ok(Err(e)) => tracing::debug!(addr = %addr, error = %e, "Candidate unreachable"),
                Err(_) => tracing::debug!(addr = %addr, "Candidate timed out"),
            }
        }
        let stream = stream.ok_or_else(|| {
            Error::TransportFailure(format!("could not reach any of {} candidates", addrs.len()))
        })?;

        let _ = stream.set_nodelay(true);
        let local = stream.local_addr()?;
        let (reader, mut writer) = stream.into_split();
        write_frame(&mut writer, offer.session.as_bytes()).await?;

        *self.writer.lock().await = Some(writer);
        self.tasks.push(tokio::spawn(read_loop(reader, events)));
        self.token = Some(offer.session.clone());
        self.post(TransportEvent::Opened);

        tracing::info!(local = %local, "TCP connection established");
        Ok(SignalingData::answer(offer.session.clone(), vec![local.to_string()]))
    }

    async fn accept_answer(&mut self, answer: &SignalingData) -> Result<()> {
        if self.token.as_deref() != Some(answer.session.as_str()) {
            return Err(Error::ProtocolError(
                "answer does not belong to this offer".into(),
            ));
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::TransportFailure("offer listener is gone".into()))?;

        let events = self.events()?;
        let writer = Arc::clone(&self.writer);
        let token = answer.session.clone();
        self.tasks
            .push(tokio::spawn(accept_loop(listener, token, writer, events)));
        Ok(())
    }

    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::TransportFailure("tcp channel is not open".into()))?;
        write_frame(writer, &frame).await?;
        Ok(())
    }

    async fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.listener = None;
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.events = None;
    }
}

// ============================================================================
// CONNECTION TASKS
// ============================================================================

/// Accept connections until one presents the expected hello
///
/// Each connection is checked on its own task, so a silent stray socket
/// cannot hold up the real answerer.
async fn accept_loop(
    listener: TcpListener,
    token: String,
    writer: SharedWriter,
    events: TransportEventSender,
) {
    let mut greetings = JoinSet::new();

    let (reader, write_half, remote) = loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        let _ = events.send(TransportEvent::Failed(format!("accept failed: {}", e)));
                        return;
                    }
                };
                let _ = stream.set_nodelay(true);
                greetings.spawn(check_hello(stream, remote, token.clone()));
            }
            Some(joined) = greetings.join_next() => {
                if let Ok(Some(verified)) = joined {
                    break verified;
                }
            }
        }
    };

    // Remaining hello checks are aborted with the set
    drop(greetings);
    drop(listener);

    *writer.lock().await = Some(write_half);
    tracing::info!(remote = %remote, "TCP peer connected");
    let _ = events.send(TransportEvent::StateChanged(format!("connected to {}", remote)));
    let _ = events.send(TransportEvent::Opened);
    read_loop(reader, events).await;
}

/// Read the first frame of a fresh connection and compare it to the token
async fn check_hello(
    stream: TcpStream,
    remote: SocketAddr,
    token: String,
) -> Option<(OwnedReadHalf, OwnedWriteHalf, SocketAddr)> {
    let (mut reader, write_half) = stream.into_split();
    match tokio::time::timeout(HELLO_TIMEOUT, read_frame(&mut reader)).await {
        Ok(Ok(Some(hello))) if hello == token.as_bytes() => Some((reader, write_half, remote)),
        _ => {
            tracing::warn!(remote = %remote, "Dropping connection without a valid hello");
            None
        }
    }
}

/// Forward inbound frames until the stream ends
async fn read_loop(mut reader: OwnedReadHalf, events: TransportEventSender) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if events.send(TransportEvent::Frame(frame)).is_err() {
                    return;
                }
            }
            Ok(None) => {
                let _ = events.send(TransportEvent::Closed);
                return;
            }
            Err(e) => {
                let _ = events.send(TransportEvent::Failed(e.to_string()));
                return;
            }
        }
    }
}

fn new_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ============================================================================
// LENGTH-PREFIXED HELPERS
// ============================================================================

/// Read one length-prefixed frame; `None` on a clean end of stream
async fn read_frame<T>(io: &mut T) -> std::io::Result<Option<Vec<u8>>>
where
    T: AsyncRead + Unpin + Send,
{
    let mut len_buf = [0u8; 4];
    match io.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Frame too large: {} bytes (max {})", len, MAX_FRAME_SIZE),
        ));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

/// Write one length-prefixed frame
async fn write_frame<T>(io: &mut T, bytes: &[u8]) -> std::io::Result<()>
where
    T: AsyncWrite + Unpin + Send,
{
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Frame too large: {} bytes (max {})",
                bytes.len(),
                MAX_FRAME_SIZE
            ),
        ));
    }

    let len = (bytes.len() as u32).to_be_bytes();
    io.write_all(&len).await?;
    io.write_all(bytes).await?;
    io.flush().await?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
