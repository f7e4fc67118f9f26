//! # Loopback Chat Demo
//!
//! Two sessions in one process, joined by an in-memory transport:
//! 1. Alice creates an offer; Bob answers it; Alice finalizes
//! 2. The channel opens and the salt travels to Bob
//! 3. Both derive the same key and trade a few messages
//! 4. A third session with the wrong passphrase cannot read anything
//!
//! ## Run
//!
//! ```bash
//! cargo run --example loopback_chat
//! ```

use std::time::Duration;

use tandem_core::{
    ChatSession, MemoryNetwork, SessionConfig, SessionEvent, SessionState,
};

const WAIT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> tandem_core::Result<()> {
    println!("=================================================");
    println!("          TANDEM LOOPBACK CHAT DEMO");
    println!("=================================================\n");

    // =========================================================================
    // STEP 1: Exchange descriptors
    // =========================================================================
    println!("1. Exchanging descriptors...\n");

    let network = MemoryNetwork::new();
    let alice = ChatSession::new("lantern harbor", network.transport(), SessionConfig::default())?;
    let bob = ChatSession::new("lantern harbor", network.transport(), SessionConfig::default())?;
    let mut bob_events = bob.subscribe();

    let offer = alice.create_offer().await?;
    println!("   Alice's offer:  {}...", &offer[..offer.len().min(32)]);
    let answer = bob.accept_offer(&offer).await?;
    println!("   Bob's answer:   {}...", &answer[..answer.len().min(32)]);
    alice.finalize(&answer).await?;

    alice.wait_for_status(|s| *s == SessionState::Open, WAIT).await?;
    bob.wait_for_status(|s| *s == SessionState::Open, WAIT).await?;
    println!("   Both sides open\n");

    // =========================================================================
    // STEP 2: Chat
    // =========================================================================
    println!("2. Chatting...\n");

    alice.send("hello").await?;
    bob.send("hi").await?;
    alice.send("the key never left either process").await?;

    let mut received = 0;
    while received < 2 {
        match tokio::time::timeout(WAIT, bob_events.recv()).await {
            Ok(Ok(SessionEvent::KeyReady { fingerprint })) => {
                println!("   Bob's key fingerprint: {}", fingerprint);
            }
            Ok(Ok(SessionEvent::MessageReceived(_))) => received += 1,
            Ok(Ok(_)) => {}
            _ => break,
        }
    }

    for message in bob.messages() {
        let who = if message.is_local() { "bob  " } else { "alice" };
        println!("   [{}] {}: {}", tandem_core::time::format_clock(message.timestamp), who, message.text);
    }
    println!();

    // =========================================================================
    // STEP 3: Wrong passphrase
    // =========================================================================
    println!("3. Connecting with the wrong passphrase...\n");

    let carol = ChatSession::new("lantern harbour", network.transport(), SessionConfig::default())?;
    let dave = ChatSession::new("lantern harbor", network.transport(), SessionConfig::default())?;
    let mut carol_events = carol.subscribe();

    let answer = carol.accept_offer(&dave.create_offer().await?).await?;
    dave.finalize(&answer).await?;
    dave.send("can you read this?").await?;

    loop {
        match tokio::time::timeout(WAIT, carol_events.recv()).await {
            Ok(Ok(SessionEvent::AuthenticationFailed { reason })) => {
                println!("   Carol rejected a frame: {}", reason);
                break;
            }
            Ok(Ok(_)) => {}
            _ => break,
        }
    }
    println!("   Carol's log has {} messages\n", carol.messages().len());

    alice.close().await;
    bob.close().await;

    println!("=================================================");
    println!("                    DONE");
    println!("=================================================");
    Ok(())
}
