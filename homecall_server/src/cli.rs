//! Command line interface for the signaling relay.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::ConfigError;
use crate::server::{self, ServerConfig};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// Signaling relay CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "homecall-signaling",
    version,
    about = "WebRTC signaling relay between a home station and remote callers"
)]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "HOMECALL_LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Seconds between keep-alive pings
    #[arg(long, env = "HOMECALL_HEARTBEAT_INTERVAL", default_value_t = 30)]
    pub heartbeat_interval_secs: u64,

    /// Seconds of silence before a connection is dropped
    #[arg(long, env = "HOMECALL_HEARTBEAT_TIMEOUT", default_value_t = 90)]
    pub heartbeat_timeout_secs: u64,

    /// Outbound frames buffered per connection
    #[arg(long, env = "HOMECALL_SEND_QUEUE", default_value_t = 256)]
    pub send_queue: usize,

    /// Base log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl ServerArgs {
    /// Validated server configuration
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let config = ServerConfig {
            listen: self.listen,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
            send_queue: self.send_queue,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Run the relay with the given arguments until SIGINT/SIGTERM.
pub async fn run(args: ServerArgs) -> anyhow::Result<()> {
    let config = args.server_config()?;
    init_tracing(&args.log_level, args.log_format);

    info!(
        listen = %config.listen,
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        timeout_secs = config.heartbeat_timeout.as_secs(),
        "starting homecall signaling relay"
    );

    server::serve(config, shutdown_signal()).await?;
    Ok(())
}

/// Resolves once the process is asked to stop
async fn shutdown_signal() {
    let signal = stop_requested().await;
    info!(signal, "shutting down");
}

#[cfg(unix)]
async fn stop_requested() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!("SIGTERM unavailable, stopping on ctrl-c only: {e}");
            return interrupted().await;
        }
    };
    tokio::select! {
        name = interrupted() => name,
        _ = term.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn stop_requested() -> &'static str {
    interrupted().await
}

async fn interrupted() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a handler the relay runs until killed
        warn!("ctrl-c unavailable: {e}");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set.
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(io::stderr))
            .init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_writer(io::stderr)).init(),
    }
}
