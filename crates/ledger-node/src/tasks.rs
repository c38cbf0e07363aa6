use ledger_core::{Block, MiningOutcome, NodeEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::AppState;

/// Poll the mempool and mine whenever it has something. The nonce search
/// runs on the blocking pool so request handling stays responsive.
pub async fn mining_loop(state: AppState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if state.node.mempool().is_empty() {
            continue;
        }
        let node = state.node.clone();
        match tokio::task::spawn_blocking(move || node.mine_once()).await {
            Ok(MiningOutcome::Committed(block)) => {
                info!(index = block.index, hash = %block.hash_hex(), "block mined")
            }
            Ok(MiningOutcome::Aborted(reason)) => info!(?reason, "mining aborted"),
            Ok(MiningOutcome::Idle) => {}
            Err(e) => warn!("mining task failed: {e}"),
        }
    }
}

/// Relay chain changes to every peer. Mined blocks go out as-is; after a
/// replacement the new tip is pushed so peers on the old fork notice and
/// sync.
pub async fn broadcaster(state: AppState, mut events: mpsc::Receiver<NodeEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::BlockMined(block) => push_to_peers(&state, &block).await,
            NodeEvent::ChainReplaced { length, tip } => {
                debug!(length, "announcing replaced chain tip");
                push_to_peers(&state, &tip).await
            }
            NodeEvent::BlockAccepted(_) | NodeEvent::PeersChanged { .. } => {}
        }
    }
    debug!("event channel closed; broadcaster stopping");
}

async fn push_to_peers(state: &AppState, block: &Block) {
    let peers = state.node.list_peers();
    if peers.is_empty() {
        return;
    }
    info!(index = block.index, peers = peers.len(), "broadcasting block");
    for peer in peers {
        match state.client.push_block(&peer, block).await {
            Ok(status) => debug!(%peer, status, "block pushed"),
            Err(e) => warn!("could not push block: {e}"),
        }
    }
}

pub async fn sync_loop(state: AppState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; bootstrap already synced.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if state.sync().await.is_none() {
            debug!("sync already running; skipping periodic pass");
        }
    }
}

/// Join the network through an index node: learn its peers, catch up,
/// announce ourselves to everyone, then catch up again with the wider set.
pub async fn bootstrap(state: &AppState, index: &str, me: Option<&str>) {
    if me.is_some_and(|me| me.trim_end_matches('/') == index.trim_end_matches('/')) {
        info!("this node is the index node; skipping bootstrap");
        return;
    }
    info!(%index, "bootstrapping from index node");
    state.node.register_peer(index);

    match state.client.fetch_peers(index).await {
        Ok(peers) => {
            let others = peers
                .into_iter()
                .filter(|p| me.is_none_or(|me| p.trim_end_matches('/') != me.trim_end_matches('/')));
            let added = state.node.register_peers(others);
            info!(added, "learned peers from index node");
        }
        Err(e) => warn!("could not fetch peers from index node: {e}"),
    }
    state.sync().await;

    if let Some(me) = me {
        for peer in state.node.list_peers() {
            if let Err(e) = state.client.announce(&peer, me).await {
                warn!("could not announce to peer: {e}");
            }
        }
    }
    state.sync().await;
}
