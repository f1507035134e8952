//! Trailhead server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with self-signed certificate (development)
//! trailhead-server --bind 0.0.0.0:4433
//!
//! # Start with TLS certificate, resolving stalled votes after two minutes
//! trailhead-server --cert cert.pem --key key.pem \
//!     --vote-timeout-secs 120 --vote-timeout-policy resolve
//! ```

use std::time::Duration;

use clap::{Parser, ValueEnum};
use trailhead_core::{SessionConfig, VoteDeadline, connection::ConnectionConfig};
use trailhead_server::{DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// What happens to a vote that is still open after `--vote-timeout-secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VoteTimeoutPolicy {
    /// Votes stay open until every present player has voted
    Disabled,
    /// Discard the vote without eliminating anyone
    Cancel,
    /// Resolve from the ballots cast so far
    Resolve,
}

/// Trailhead game session server
#[derive(Parser, Debug)]
#[command(name = "trailhead-server")]
#[command(about = "Live multi-party game session coordinator")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Seconds without traffic before a connection is closed
    #[arg(long, default_value = "60")]
    idle_timeout_secs: u64,

    /// Seconds an unresolved vote may stay open
    #[arg(long, default_value = "120")]
    vote_timeout_secs: u64,

    /// Policy for votes that outlive `--vote-timeout-secs`
    #[arg(long, value_enum, default_value = "disabled")]
    vote_timeout_policy: VoteTimeoutPolicy,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn vote_deadline(&self) -> VoteDeadline {
        let after = Duration::from_secs(self.vote_timeout_secs);
        match self.vote_timeout_policy {
            VoteTimeoutPolicy::Disabled => VoteDeadline::Disabled,
            VoteTimeoutPolicy::Cancel => VoteDeadline::Cancel(after),
            VoteTimeoutPolicy::Resolve => VoteDeadline::ResolveWithAbstentions(after),
        }
    }

    fn connection_config(&self) -> ConnectionConfig {
        let idle_timeout = Duration::from_secs(self.idle_timeout_secs);
        ConnectionConfig {
            idle_timeout,
            heartbeat_interval: idle_timeout / 3,
            ..ConnectionConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Trailhead server starting");
    tracing::info!("Binding to {}", args.bind);

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("No TLS certificate provided - using self-signed certificate");
    }

    let vote_deadline = args.vote_deadline();
    tracing::info!("Vote deadline: {:?}", vote_deadline);

    let config = ServerRuntimeConfig {
        driver: DriverConfig {
            connection: args.connection_config(),
            max_connections: args.max_connections,
            session: SessionConfig { vote_deadline },
        },
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        ..Default::default()
    };

    let server = Server::bind(config)?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
