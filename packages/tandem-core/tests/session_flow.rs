//! End-to-end session scenarios over the in-memory and TCP transports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};

use tandem_core::crypto::{KdfParams, Nonce, Salt, SessionKey, MIN_ITERATIONS};
use tandem_core::protocol::Frame;
use tandem_core::transport::{SignalingData, TransportEvent, TransportEventSender};
use tandem_core::{
    ChatSession, CryptoProvider, Error, MemoryNetwork, Message, Origin, Passphrase,
    PeerTransport, Role, SessionConfig, SessionEvent, SessionState, SystemCrypto, TcpTransport,
    TcpTransportConfig, UndecryptablePolicy,
};

const WAIT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> SessionConfig {
    SessionConfig {
        kdf_iterations: MIN_ITERATIONS,
        send_timeout: WAIT,
        ..Default::default()
    }
}

fn session(passphrase: &str, transport: impl PeerTransport, config: SessionConfig) -> ChatSession {
    ChatSession::new(passphrase, transport, config).expect("session starts")
}

async fn handshake(alice: &ChatSession, bob: &ChatSession) {
    let offer = assert_ok!(alice.create_offer().await);
    let answer = assert_ok!(bob.accept_offer(&offer).await);
    assert_ok!(alice.finalize(&answer).await);

    assert_ok!(alice.wait_for_status(|s| *s == SessionState::Open, WAIT).await);
    assert_ok!(bob.wait_for_status(|s| *s == SessionState::Open, WAIT).await);
}

/// Wait for the first event matching `pred`
async fn next_event<F>(rx: &mut broadcast::Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn next_received(rx: &mut broadcast::Receiver<SessionEvent>) -> Message {
    match next_event(rx, |e| matches!(e, SessionEvent::MessageReceived(_))).await {
        SessionEvent::MessageReceived(message) => message,
        _ => unreachable!(),
    }
}

fn peer_texts(session: &ChatSession) -> Vec<String> {
    session
        .messages()
        .into_iter()
        .filter(|m| m.origin == Origin::Peer)
        .map(|m| m.text)
        .collect()
}

/// System crypto with a deliberately slow key derivation
struct SlowKdf(Duration);

impl CryptoProvider for SlowKdf {
    fn fill_random(&self, dest: &mut [u8]) -> tandem_core::Result<()> {
        SystemCrypto.fill_random(dest)
    }

    fn derive_key(
        &self,
        passphrase: &Passphrase,
        salt: &Salt,
        params: &KdfParams,
    ) -> tandem_core::Result<SessionKey> {
        std::thread::sleep(self.0);
        SystemCrypto.derive_key(passphrase, salt, params)
    }

    fn seal(&self, key: &SessionKey, nonce: &Nonce, pt: &[u8]) -> tandem_core::Result<Vec<u8>> {
        SystemCrypto.seal(key, nonce, pt)
    }

    fn open(&self, key: &SessionKey, nonce: &Nonce, ct: &[u8]) -> tandem_core::Result<Vec<u8>> {
        SystemCrypto.open(key, nonce, ct)
    }
}

/// Test-side handle for posting events into a [`ScriptedTransport`]
#[derive(Clone, Default)]
struct ScriptedLink {
    events: Arc<Mutex<Option<TransportEventSender>>>,
}

impl ScriptedLink {
    fn post(&self, event: TransportEvent) {
        let events = self.events.lock().clone().expect("transport attached");
        events.send(event).expect("session listening");
    }
}

/// Transport whose connectivity is driven entirely by the test
struct ScriptedTransport {
    link: ScriptedLink,
}

#[async_trait]
impl PeerTransport for ScriptedTransport {
    fn attach(&mut self, events: TransportEventSender) {
        *self.link.events.lock() = Some(events);
    }

    async fn create_offer(&mut self) -> tandem_core::Result<SignalingData> {
        Ok(SignalingData::offer("scripted", Vec::new()))
    }

    async fn create_answer(
        &mut self,
        offer: &SignalingData,
    ) -> tandem_core::Result<SignalingData> {
        Ok(SignalingData::answer(offer.session.clone(), Vec::new()))
    }

    async fn accept_answer(&mut self, _answer: &SignalingData) -> tandem_core::Result<()> {
        Ok(())
    }

    async fn send(&mut self, _frame: Vec<u8>) -> tandem_core::Result<()> {
        Ok(())
    }

    async fn close(&mut self) {}
}

/// An answerer session over a scripted link, already in `Connecting`
async fn scripted_answerer() -> (Arc<ChatSession>, ScriptedLink) {
    let link = ScriptedLink::default();
    let bob = Arc::new(session(
        "scripted",
        ScriptedTransport { link: link.clone() },
        config(),
    ));
    let offer = SignalingData::offer("scripted", Vec::new()).encode().unwrap();
    assert_ok!(bob.accept_offer(&offer).await);
    assert_eq!(bob.status(), SessionState::Connecting);
    (bob, link)
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_hello_hi_over_memory() {
    init_tracing();
    let network = MemoryNetwork::new();
    let alice = session("correct horse battery", network.transport(), config());
    let bob = session("correct horse battery", network.transport(), config());
    let mut alice_rx = alice.subscribe();
    let mut bob_rx = bob.subscribe();

    handshake(&alice, &bob).await;
    assert_eq!(alice.role(), Some(Role::Offerer));
    assert_eq!(bob.role(), Some(Role::Answerer));

    let sent = assert_ok!(alice.send("hello").await);
    assert_eq!(sent.origin, Origin::Local);

    let received = next_received(&mut bob_rx).await;
    assert_eq!(received.text, "hello");
    assert_eq!(received.origin, Origin::Peer);
    assert!(received.verified);

    assert_ok!(bob.send("hi").await);
    assert_eq!(next_received(&mut alice_rx).await.text, "hi");

    let alice_log: Vec<_> = alice
        .messages()
        .into_iter()
        .map(|m| (m.origin, m.text))
        .collect();
    assert_eq!(
        alice_log,
        vec![
            (Origin::Local, "hello".to_string()),
            (Origin::Peer, "hi".to_string())
        ]
    );
    assert_eq!(peer_texts(&bob), ["hello"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_both_sides_derive_the_same_key() {
    let network = MemoryNetwork::new();
    let alice = session("same words", network.transport(), config());
    let bob = session("same words", network.transport(), config());
    let mut alice_rx = alice.subscribe();
    let mut bob_rx = bob.subscribe();

    handshake(&alice, &bob).await;

    let fingerprint = |event: SessionEvent| match event {
        SessionEvent::KeyReady { fingerprint } => fingerprint,
        _ => unreachable!(),
    };
    let a = fingerprint(next_event(&mut alice_rx, |e| matches!(e, SessionEvent::KeyReady { .. })).await);
    let b = fingerprint(next_event(&mut bob_rx, |e| matches!(e, SessionEvent::KeyReady { .. })).await);
    assert_eq!(a, b);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_hello_hi_over_tcp_loopback() {
    init_tracing();
    let offerer = TcpTransport::new(TcpTransportConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    });
    let answerer = TcpTransport::new(TcpTransportConfig::default());

    let alice = session("over the wire", offerer, config());
    let bob = session("over the wire", answerer, config());
    let mut alice_rx = alice.subscribe();
    let mut bob_rx = bob.subscribe();

    handshake(&alice, &bob).await;

    assert_ok!(alice.send("hello").await);
    assert_eq!(next_received(&mut bob_rx).await.text, "hello");

    assert_ok!(bob.send("hi").await);
    assert_eq!(next_received(&mut alice_rx).await.text, "hi");

    alice.close().await;
    assert_ok!(bob.wait_for_status(|s| *s == SessionState::Closed, WAIT).await);
}

// ============================================================================
// ORDERING AND READINESS
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_answerer_send_before_salt_is_deferred() {
    let network = MemoryNetwork::new();
    let alice = session("deferred", network.transport(), config());
    let bob = Arc::new(session("deferred", network.transport(), config()));
    let mut alice_rx = alice.subscribe();

    let offer = assert_ok!(alice.create_offer().await);
    let answer = assert_ok!(bob.accept_offer(&offer).await);

    // Bob has no channel and no salt yet
    let early = {
        let bob = Arc::clone(&bob);
        tokio::spawn(async move { bob.send("sent early").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!early.is_finished());

    assert_ok!(alice.finalize(&answer).await);

    assert_ok!(early.await.expect("send task"));
    assert_eq!(next_received(&mut alice_rx).await.text, "sent early");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_frames_during_key_derivation_are_buffered_in_order() {
    init_tracing();
    let network = MemoryNetwork::new();
    let alice = session("slow and steady", network.transport(), config());
    let bob = ChatSession::with_crypto(
        "slow and steady",
        network.transport(),
        config(),
        Arc::new(SlowKdf(Duration::from_millis(800))),
    )
    .expect("session starts");
    let mut bob_rx = bob.subscribe();

    handshake(&alice, &bob).await;

    // Bob is still deriving when these land
    assert_ok!(alice.send("one").await);
    assert_ok!(alice.send("two").await);

    let mut received = Vec::new();
    let mut rejected = 0;
    tokio::time::timeout(WAIT, async {
        while received.len() < 2 {
            match bob_rx.recv().await {
                Ok(SessionEvent::MessageReceived(message)) => received.push(message),
                Ok(SessionEvent::AuthenticationFailed { .. })
                | Ok(SessionEvent::FrameRejected { .. }) => rejected += 1,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for buffered messages");

    assert_eq!(rejected, 0);
    let summary: Vec<_> = received
        .iter()
        .map(|m| (m.text.as_str(), m.verified))
        .collect();
    assert_eq!(summary, [("one", true), ("two", true)]);
    assert_eq!(peer_texts(&bob), ["one", "two"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timed_out_send_is_withdrawn() {
    let network = MemoryNetwork::new();
    let alice = session("withdrawn", network.transport(), config());
    let bob = session(
        "withdrawn",
        network.transport(),
        SessionConfig {
            send_timeout: Duration::from_millis(100),
            ..config()
        },
    );
    let mut alice_rx = alice.subscribe();
    let mut bob_rx = bob.subscribe();

    let result = bob.send("too early").await;
    assert!(matches!(result, Err(Error::NotReady(_))));

    handshake(&alice, &bob).await;
    next_event(&mut bob_rx, |e| matches!(e, SessionEvent::KeyReady { .. })).await;

    assert_ok!(bob.send("after").await);
    assert_eq!(next_received(&mut alice_rx).await.text, "after");

    assert_eq!(peer_texts(&alice), ["after"]);
    assert!(bob.messages().iter().all(|m| m.text != "too early"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_offer_leaves_session_idle() {
    let network = MemoryNetwork::new();
    let alice = session("pw", network.transport(), config());
    let bob = session("pw", network.transport(), config());

    for bad in ["", "not a descriptor", "e30="] {
        let err = assert_err!(bob.accept_offer(bad).await);
        assert!(matches!(err, Error::ProtocolError(_)), "{:?} gave {:?}", bad, err);
        assert_eq!(bob.status(), SessionState::Idle);
        assert_eq!(bob.role(), None);
    }

    // An answer where an offer is expected is also rejected
    let offer = assert_ok!(alice.create_offer().await);
    let other = session("pw", network.transport(), config());
    let answer = assert_ok!(other.accept_offer(&offer).await);
    assert!(matches!(
        bob.accept_offer(&answer).await,
        Err(Error::ProtocolError(_))
    ));
    assert_eq!(bob.status(), SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_operations_in_wrong_state() {
    let network = MemoryNetwork::new();
    let alice = session("pw", network.transport(), config());
    let bob = session("pw", network.transport(), config());
    handshake(&alice, &bob).await;

    assert!(matches!(alice.create_offer().await, Err(Error::InvalidState(_))));
    assert!(matches!(bob.accept_offer("x").await, Err(Error::InvalidState(_))));
    assert!(matches!(bob.finalize("x").await, Err(Error::InvalidState(_))));
    assert_eq!(alice.status(), SessionState::Open);
    assert_eq!(bob.status(), SessionState::Open);
}

// ============================================================================
// AUTHENTICATION FAILURES
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_mismatched_passphrase_is_reported_not_delivered() {
    let network = MemoryNetwork::new();
    let alice = session("open sesame", network.transport(), config());
    let bob = session("open sesame!", network.transport(), config());
    let mut alice_rx = alice.subscribe();
    let mut bob_rx = bob.subscribe();

    handshake(&alice, &bob).await;

    assert_ok!(alice.send("secret").await);
    next_event(&mut bob_rx, |e| matches!(e, SessionEvent::AuthenticationFailed { .. })).await;

    assert_ok!(bob.send("reply").await);
    next_event(&mut alice_rx, |e| matches!(e, SessionEvent::AuthenticationFailed { .. })).await;

    assert!(peer_texts(&alice).is_empty());
    assert!(peer_texts(&bob).is_empty());
    assert_eq!(bob.status(), SessionState::Open);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_show_raw_policy_logs_unverified_frame() {
    let network = MemoryNetwork::new();
    let alice = session("alpha", network.transport(), config());
    let bob = session(
        "bravo",
        network.transport(),
        SessionConfig {
            undecryptable: UndecryptablePolicy::ShowRaw,
            ..config()
        },
    );
    let mut bob_rx = bob.subscribe();

    handshake(&alice, &bob).await;
    assert_ok!(alice.send("secret").await);

    let raw = next_received(&mut bob_rx).await;
    assert!(!raw.verified);
    assert!(raw.text.contains("\"iv\""));
    assert!(!raw.text.contains("secret"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tampered_frame_fails_authentication() {
    let network = MemoryNetwork::new();
    network.set_interceptor(Arc::new(|bytes: Vec<u8>| match Frame::decode(&bytes) {
        Ok(Frame::Data { iv, mut data }) => {
            data[0] ^= 0x01;
            Frame::Data { iv, data }.encode().ok()
        }
        _ => Some(bytes),
    }));

    let alice = session("tamper", network.transport(), config());
    let bob = session("tamper", network.transport(), config());
    let mut bob_rx = bob.subscribe();

    handshake(&alice, &bob).await;
    assert_ok!(alice.send("pay 10").await);

    next_event(&mut bob_rx, |e| matches!(e, SessionEvent::AuthenticationFailed { .. })).await;
    assert!(peer_texts(&bob).is_empty());
}

// ============================================================================
// TEARDOWN
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_peer_close_after_open_is_closed_not_failed() {
    let network = MemoryNetwork::new();
    let alice = session("bye", network.transport(), config());
    let bob = session("bye", network.transport(), config());
    let mut bob_rx = bob.subscribe();

    handshake(&alice, &bob).await;
    next_event(&mut bob_rx, |e| matches!(e, SessionEvent::SaltDelivered)).await;

    alice.close().await;
    assert_eq!(alice.status(), SessionState::Closed);
    let state = assert_ok!(bob.wait_for_status(|s| s.is_terminal(), WAIT).await);
    assert_eq!(state, SessionState::Closed);

    assert!(bob.send("anyone there?").await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_without_salt_reports_it() {
    let network = MemoryNetwork::new();
    network.set_interceptor(Arc::new(|bytes: Vec<u8>| match Frame::decode(&bytes) {
        Ok(frame) if frame.is_control() => None,
        _ => Some(bytes),
    }));

    let alice = session("lost salt", network.transport(), config());
    let bob = Arc::new(session("lost salt", network.transport(), config()));
    let mut bob_rx = bob.subscribe();

    handshake(&alice, &bob).await;

    let pending = {
        let bob = Arc::clone(&bob);
        tokio::spawn(async move { bob.send("never sent").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    alice.close().await;

    let event = next_event(&mut bob_rx, |e| matches!(e, SessionEvent::Error { .. })).await;
    match event {
        SessionEvent::Error { message, .. } => assert!(message.contains("salt never delivered")),
        _ => unreachable!(),
    }
    assert_ok!(bob.wait_for_status(|s| *s == SessionState::Closed, WAIT).await);

    let result = pending.await.expect("send task");
    assert!(matches!(result, Err(Error::TransportFailure(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abandoned_offer_fails_finalize() {
    let network = MemoryNetwork::new();
    let alice = session("gone", network.transport(), config());
    let bob = session("gone", network.transport(), config());

    let offer = assert_ok!(alice.create_offer().await);
    let answer = assert_ok!(bob.accept_offer(&offer).await);
    bob.close().await;

    let err = assert_err!(alice.finalize(&answer).await);
    assert!(matches!(err, Error::TransportFailure(_)));
    assert_eq!(alice.status(), SessionState::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transport_failure_while_open_fails_session() {
    let (bob, link) = scripted_answerer().await;
    let mut bob_rx = bob.subscribe();

    link.post(TransportEvent::Opened);
    assert_ok!(bob.wait_for_status(|s| *s == SessionState::Open, WAIT).await);

    // No salt has arrived, so this waits in the queue
    let queued = {
        let bob = Arc::clone(&bob);
        tokio::spawn(async move { bob.send("queued").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    link.post(TransportEvent::Failed("link dropped".into()));

    let state = assert_ok!(bob.wait_for_status(|s| s.is_terminal(), WAIT).await);
    assert_eq!(state, SessionState::Failed);
    match next_event(&mut bob_rx, |e| matches!(e, SessionEvent::Error { .. })).await {
        SessionEvent::Error { code, message } => {
            assert_eq!(code, Error::TransportFailure(String::new()).code());
            assert!(message.contains("link dropped"));
        }
        _ => unreachable!(),
    }

    let result = queued.await.expect("send task");
    assert!(matches!(result, Err(Error::TransportFailure(_))));
    assert!(matches!(bob.send("later").await, Err(Error::SessionClosed)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_before_open_fails_session() {
    let (bob, link) = scripted_answerer().await;
    let mut bob_rx = bob.subscribe();

    let queued = {
        let bob = Arc::clone(&bob);
        tokio::spawn(async move { bob.send("queued").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    link.post(TransportEvent::Closed);

    let state = assert_ok!(bob.wait_for_status(|s| s.is_terminal(), WAIT).await);
    assert_eq!(state, SessionState::Failed);
    next_event(&mut bob_rx, |e| matches!(e, SessionEvent::Error { .. })).await;

    let result = queued.await.expect("send task");
    assert!(matches!(result, Err(Error::TransportFailure(_))));
    assert!(matches!(bob.send("later").await, Err(Error::SessionClosed)));
}
