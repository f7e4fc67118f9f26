//! Tandem terminal client
//!
//! One side runs `tandem offer`, the other `tandem answer`. The two paste
//! descriptors to each other, type the same passphrase, and chat.

mod chat;

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tandem_core::crypto::DEFAULT_ITERATIONS;
use tandem_core::{SessionConfig, TcpTransportConfig, UndecryptablePolicy};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "tandem", version, about = "Passphrase-encrypted peer-to-peer chat")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a session and print an offer for your peer
    ///
    /// With the default wildcard bind the offer only advertises 127.0.0.1,
    /// which a peer on another machine cannot reach. Pass `--bind` with a
    /// concrete LAN address or `--advertise` with the address your peer
    /// should dial.
    Offer {
        /// Address to listen on; a wildcard address is advertised as loopback
        #[arg(long, default_value = "0.0.0.0:0", env = "TANDEM_BIND")]
        bind: SocketAddr,

        /// Address to put in the offer instead of the bound one (repeatable).
        /// Use this when the peer reaches you through a forwarded port.
        #[arg(long, env = "TANDEM_ADVERTISE", value_delimiter = ',')]
        advertise: Vec<String>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Join a session from your peer's offer
    Answer {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args)]
struct SessionArgs {
    /// Shared passphrase; prompted for when not given
    #[arg(long, env = "TANDEM_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// PBKDF2 iterations; must match your peer
    #[arg(long, default_value_t = DEFAULT_ITERATIONS, env = "TANDEM_KDF_ITERATIONS")]
    kdf_iterations: u32,

    /// Seconds a message waits for the channel before giving up
    #[arg(long, default_value_t = 30, env = "TANDEM_SEND_TIMEOUT_SECS")]
    send_timeout_secs: u64,

    /// Show frames that fail to decrypt instead of only warning
    #[arg(long)]
    show_raw: bool,
}

impl SessionArgs {
    fn config(&self) -> SessionConfig {
        SessionConfig {
            kdf_iterations: self.kdf_iterations,
            send_timeout: Duration::from_secs(self.send_timeout_secs),
            undecryptable: if self.show_raw {
                UndecryptablePolicy::ShowRaw
            } else {
                UndecryptablePolicy::Warn
            },
            ..Default::default()
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // Logs go to stderr so stdout stays a clean chat transcript
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=info,tandem_core=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Offer {
            bind,
            advertise,
            session,
        } => {
            let transport = TcpTransportConfig {
                bind_addr: bind,
                advertise,
                ..Default::default()
            };
            chat::run(chat::Side::Offer, transport, session.config(), session.passphrase).await
        }
        Command::Answer { session } => {
            chat::run(
                chat::Side::Answer,
                TcpTransportConfig::default(),
                session.config(),
                session.passphrase,
            )
            .await
        }
    }
}
