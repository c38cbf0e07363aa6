//! Longest-valid-chain fork resolution against the peer set.
//!
//! The rule is deliberately plain: the longest chain that validates and shares
//! our genesis wins. There is no cumulative-work comparison, so a peer can win
//! with a longer chain mined at a lower difficulty than ours as long as every
//! block meets our own difficulty target.

use crate::{chain::ChainStore, Block};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("network error talking to {peer}: {message}")]
    Network { peer: String, message: String },
    #[error("{peer} answered with status {status}")]
    Status { peer: String, status: u16 },
    #[error("malformed payload from {peer}: {message}")]
    Malformed { peer: String, message: String },
}

/// A peer's chain as reported, before its blocks are decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerChain {
    pub length: u64,
    pub chain: Vec<serde_json::Value>,
}

/// Transport used by the sync pass. Implementations must bound every call
/// with a short timeout.
pub trait PeerClient: Send + Sync {
    fn fetch_chain(&self, peer: &str) -> impl Future<Output = Result<PeerChain, PeerError>> + Send;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub peers_queried: usize,
    pub failures: usize,
    pub rejected: usize,
    pub replaced: bool,
    pub length: usize,
}

fn decode_chain(peer: &str, reported: PeerChain) -> Result<Vec<Block>, PeerError> {
    if reported.length != reported.chain.len() as u64 {
        return Err(PeerError::Malformed {
            peer: peer.to_string(),
            message: format!(
                "reported length {} but sent {} blocks",
                reported.length,
                reported.chain.len()
            ),
        });
    }
    reported
        .chain
        .into_iter()
        .map(serde_json::from_value::<Block>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PeerError::Malformed {
            peer: peer.to_string(),
            message: e.to_string(),
        })
}

/// One sync pass over `peers`. Network I/O happens without any chain lock;
/// the winning candidate is installed atomically and only if it is still
/// strictly longer than the local chain at that moment.
pub async fn sync_chain<P: PeerClient>(
    chain: &ChainStore,
    peers: &[String],
    client: &P,
) -> SyncReport {
    let mut report = SyncReport::default();
    let mut best_len = chain.len();
    let mut best: Option<Vec<Block>> = None;

    for peer in peers {
        report.peers_queried += 1;
        let reported = match client.fetch_chain(peer).await {
            Ok(reported) => reported,
            Err(e) => {
                report.failures += 1;
                warn!("skipping peer during sync: {e}");
                continue;
            }
        };
        if reported.length as usize <= best_len {
            debug!(%peer, length = reported.length, best_len, "peer chain not longer");
            continue;
        }
        let candidate = match decode_chain(peer, reported) {
            Ok(candidate) => candidate,
            Err(e) => {
                report.failures += 1;
                warn!("skipping peer during sync: {e}");
                continue;
            }
        };
        if let Err(e) = chain.is_chain_valid(&candidate) {
            report.rejected += 1;
            warn!(%peer, "peer chain rejected: {e}");
            continue;
        }
        info!(%peer, length = candidate.len(), "new best candidate chain");
        best_len = candidate.len();
        best = Some(candidate);
    }

    if let Some(candidate) = best {
        match chain.replace_if_longer(candidate) {
            Ok(replaced) => report.replaced = replaced,
            Err(e) => {
                report.rejected += 1;
                warn!("best candidate failed validation at install: {e}");
            }
        }
    }
    report.length = chain.len();
    report
}
