//! Alchemy state service daemon
//!
//! Serves one state namespace over HTTP so multiple machines can share
//! a run's records. Storage is a plain `FileStore` directory; the wire
//! protocol and authentication live in `alchemy-server`.

use alchemy_state::FileStore;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "alchemyd", version, about = "Alchemy state service daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve a state namespace over HTTP
    Serve {
        /// Directory holding the state records
        #[arg(long, default_value = ".alchemy/state")]
        root: PathBuf,

        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7373")]
        addr: SocketAddr,

        /// Bearer token clients must present
        #[arg(long, env = "ALCHEMY_STATE_TOKEN")]
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { root, addr, token } => serve(root, addr, token).await,
    }
}

async fn serve(root: PathBuf, addr: SocketAddr, token: String) -> anyhow::Result<()> {
    tracing::info!(root = %root.display(), %addr, "starting state service");
    let store = Arc::new(FileStore::new(&root));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    alchemy_server::serve(listener, store, token)
        .await
        .context("state service exited")
}
