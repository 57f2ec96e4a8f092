//! Binary entry point for the signaling relay

use clap::Parser;
use homecall_server::cli::{self, ServerArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run(ServerArgs::parse()).await
}
