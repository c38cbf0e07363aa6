use clap::Parser;
use ledger_core::{constants::DEFAULT_DIFFICULTY, Node};
use std::{net::SocketAddr, time::Duration};
use tracing::{info, Level};

mod api;
mod client;
mod constants;
mod tasks;

use api::AppState;
use client::HttpPeerClient;
use constants::{EVENT_CHANNEL_CAPACITY, PEER_TIMEOUT};

#[derive(Parser, Debug)]
#[command(name = "ledger-node", about = "Proof-of-work ledger node")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "LEDGER_LISTEN", default_value = "127.0.0.1:8080")]
    listen: String,

    /// Base URL other nodes use to reach this one, e.g. http://127.0.0.1:8080
    #[arg(long, env = "LEDGER_ADVERTISE_URL")]
    advertise_url: Option<String>,

    /// Index node to bootstrap peers and chain from
    #[arg(long, env = "LEDGER_BOOTSTRAP")]
    bootstrap: Option<String>,

    /// Required leading zero hex digits per block; fixed for the node's lifetime
    #[arg(long, env = "LEDGER_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: usize,

    /// Per-request timeout for peer calls, in seconds
    #[arg(long, env = "LEDGER_PEER_TIMEOUT_SECS", default_value_t = PEER_TIMEOUT.as_secs())]
    peer_timeout_secs: u64,

    /// How often the miner checks the mempool, in milliseconds
    #[arg(long, env = "LEDGER_MINE_INTERVAL_MS", default_value_t = 1000)]
    mine_interval_ms: u64,

    /// Periodic sync interval in seconds; 0 disables periodic sync
    #[arg(long, env = "LEDGER_SYNC_INTERVAL_SECS", default_value_t = 30)]
    sync_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let node = Node::new(args.difficulty);
    let client = HttpPeerClient::new(Duration::from_secs(args.peer_timeout_secs))?;
    let state = AppState::new(node, client);

    let events = state.node.events(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(tasks::broadcaster(state.clone(), events));

    if let Some(index) = args.bootstrap.as_deref() {
        tasks::bootstrap(&state, index, args.advertise_url.as_deref()).await;
    }

    tokio::spawn(tasks::mining_loop(
        state.clone(),
        Duration::from_millis(args.mine_interval_ms.max(1)),
    ));
    if args.sync_interval_secs > 0 {
        tokio::spawn(tasks::sync_loop(
            state.clone(),
            Duration::from_secs(args.sync_interval_secs),
        ));
    }

    let app = api::router(state);
    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
    }
    info!("shutting down");
}
