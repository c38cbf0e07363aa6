//! The node context: one value owning chain, mempool, peers and miner, handed
//! by reference to the transport, mining and sync tasks.

use crate::{
    chain::{ChainError, ChainResponse, ChainStore},
    mempool::Mempool,
    mine::{MiningEngine, MiningOutcome},
    notify::{ChangeNotifier, NodeEvent},
    peers::PeerSet,
    sync::{sync_chain, PeerClient, SyncReport},
    Block, Transaction,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Clone)]
pub struct Node {
    chain: Arc<ChainStore>,
    mempool: Arc<Mempool>,
    peers: Arc<PeerSet>,
    notifier: Arc<ChangeNotifier>,
    miner: Arc<MiningEngine>,
}

impl Node {
    pub fn new(difficulty: usize) -> Self {
        let notifier = Arc::new(ChangeNotifier::new());
        let chain = Arc::new(ChainStore::new(difficulty, notifier.clone()));
        let mempool = Arc::new(Mempool::new());
        let peers = Arc::new(PeerSet::new(notifier.clone()));
        let miner = Arc::new(MiningEngine::new(chain.clone(), mempool.clone()));
        info!(difficulty, genesis = %hex::encode(chain.genesis_hash()), "node initialised");
        Self {
            chain,
            mempool,
            peers,
            notifier,
            miner,
        }
    }

    pub fn chain(&self) -> &Arc<ChainStore> {
        &self.chain
    }

    pub fn mempool(&self) -> &Arc<Mempool> {
        &self.mempool
    }

    pub fn peers(&self) -> &Arc<PeerSet> {
        &self.peers
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn miner(&self) -> &Arc<MiningEngine> {
        &self.miner
    }

    /// Bounded event stream for a relay or UI.
    pub fn events(&self, capacity: usize) -> mpsc::Receiver<NodeEvent> {
        self.notifier.channel(capacity)
    }

    /// Returns `false` when `dedup_key` was already seen.
    pub fn submit_transaction(&self, tx: Transaction, dedup_key: &str) -> bool {
        self.mempool.submit(tx, dedup_key)
    }

    /// Append a block pushed by a peer, stopping any now-stale local search.
    /// On rejection the caller is expected to start a sync pass.
    pub fn submit_peer_block(&self, block: Block) -> Result<(), ChainError> {
        self.chain.append_from_peer(block)?;
        self.miner.cancel_current();
        Ok(())
    }

    pub fn register_peer(&self, url: &str) -> bool {
        self.peers.add(url)
    }

    pub fn register_peers<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.peers.extend(urls)
    }

    pub fn export_chain(&self) -> ChainResponse {
        self.chain.export()
    }

    pub fn list_peers(&self) -> Vec<String> {
        self.peers.list()
    }

    pub fn balance(&self, address: &str) -> i128 {
        self.chain.balance_of(address)
    }

    pub fn mine_once(&self) -> MiningOutcome {
        self.miner.mine_once()
    }

    /// Run one fork-resolution pass against the current peer set.
    pub async fn sync_with_peers<P: PeerClient>(&self, client: &P) -> SyncReport {
        let peers = self.peers.list();
        let report = sync_chain(&self.chain, &peers, client).await;
        if report.replaced {
            self.miner.cancel_current();
        }
        info!(
            peers = report.peers_queried,
            failures = report.failures,
            rejected = report.rejected,
            replaced = report.replaced,
            length = report.length,
            "sync pass finished"
        );
        report
    }
}
