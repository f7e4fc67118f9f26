//! Interactive offer/answer exchange and the chat loop.

use std::sync::Arc;

use color_eyre::eyre::{bail, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::{broadcast, mpsc};

use tandem_core::time::format_clock;
use tandem_core::{
    ChatSession, Message, SessionConfig, SessionEvent, TcpTransport, TcpTransportConfig,
};

type Input = Lines<BufReader<Stdin>>;

/// Which half of the handshake this process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Offer,
    Answer,
}

pub async fn run(
    side: Side,
    transport: TcpTransportConfig,
    config: SessionConfig,
    passphrase: Option<String>,
) -> Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let passphrase = match passphrase {
        Some(p) => p,
        None => prompt(&mut input, "Passphrase: ").await?,
    };
    if passphrase.is_empty() {
        bail!("a passphrase is required");
    }

    let session = Arc::new(ChatSession::new(
        passphrase,
        TcpTransport::new(transport),
        config,
    )?);
    let events = session.subscribe();

    match side {
        Side::Offer => offer(&session, &mut input).await?,
        Side::Answer => answer(&session, &mut input).await?,
    }

    let result = chat(Arc::clone(&session), events, &mut input).await;
    session.close().await;
    result
}

// ── Handshake ─────────────────────────────────────────────────────────────────

async fn offer(session: &ChatSession, input: &mut Input) -> Result<()> {
    let descriptor = session.create_offer().await?;
    println!("\nSend this offer to your peer:\n\n{}\n", descriptor);

    loop {
        let answer = prompt(input, "Paste their answer: ").await?;
        match session.finalize(&answer).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_recoverable() => eprintln!("!! {} (try again)", e),
            Err(e) => return Err(e.into()),
        }
    }
}

async fn answer(session: &ChatSession, input: &mut Input) -> Result<()> {
    loop {
        let offer = prompt(input, "Paste their offer: ").await?;
        match session.accept_offer(&offer).await {
            Ok(descriptor) => {
                println!("\nSend this answer back to your peer:\n\n{}\n", descriptor);
                return Ok(());
            }
            Err(e) if e.is_recoverable() => eprintln!("!! {} (try again)", e),
            Err(e) => return Err(e.into()),
        }
    }
}

async fn prompt(input: &mut Input, label: &str) -> Result<String> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(label.as_bytes()).await?;
    stderr.flush().await?;

    loop {
        match input.next_line().await? {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(line.trim().to_string()),
            None => bail!("input closed"),
        }
    }
}

// ── Chat Loop ─────────────────────────────────────────────────────────────────

async fn chat(
    session: Arc<ChatSession>,
    mut events: broadcast::Receiver<SessionEvent>,
    input: &mut Input,
) -> Result<()> {
    eprintln!("-- type a message and press enter; /quit to leave");

    // One sender task keeps outbound messages in typing order
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<String>();
    let sender = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            while let Some(text) = outbox_rx.recv().await {
                if let Err(e) = session.send(&text).await {
                    eprintln!("!! not sent: {}", e);
                    if e.is_fatal() {
                        break;
                    }
                }
            }
        })
    };

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else { break };
                let text = line.trim_end();
                if text == "/quit" {
                    break;
                }
                if !text.is_empty() {
                    let _ = outbox.send(text.to_string());
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if !render(&event) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event display fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    sender.abort();
    Ok(())
}

/// Print one event; returns false once the session is over
fn render(event: &SessionEvent) -> bool {
    match event {
        SessionEvent::StatusChanged { state } => {
            eprintln!("-- {}", state);
            return !state.is_terminal();
        }
        SessionEvent::KeyReady { fingerprint } => {
            eprintln!("-- key fingerprint {} (compare it with your peer)", fingerprint);
        }
        SessionEvent::MessageSent(message) => print_message("you ", message),
        SessionEvent::MessageReceived(message) => print_message("peer", message),
        SessionEvent::AuthenticationFailed { .. } => {
            eprintln!("!! a message could not be decrypted; do you both have the same passphrase?");
        }
        SessionEvent::FrameRejected { reason } => eprintln!("!! bad frame from peer: {}", reason),
        SessionEvent::Error { message, .. } => eprintln!("!! {}", message),
        SessionEvent::TransportStatus { .. }
        | SessionEvent::LocalDescriptor { .. }
        | SessionEvent::SaltDelivered => {}
    }
    true
}

fn print_message(who: &str, message: &Message) {
    let marker = if message.verified { "" } else { " (unverified)" };
    println!(
        "[{}] {}{}: {}",
        format_clock(message.timestamp),
        who,
        marker,
        message.text
    );
}
