use crate::{chain::ChainStore, mempool::Mempool, now_secs, Block, CancellationToken, ChainError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the engine is in its cycle. `Committed` and `Aborted` describe the
/// last finished cycle and hold until the next one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningState {
    Idle,
    Mining,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The search was cancelled, usually because the tip moved underneath it.
    Cancelled,
    /// The finished block no longer extends the tip.
    Rejected(ChainError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningOutcome {
    /// Mempool was empty; nothing to do.
    Idle,
    Committed(Block),
    Aborted(AbortReason),
}

/// Turns pending transactions into blocks. The nonce search runs without any
/// chain lock; only the finished candidate is submitted to the [`ChainStore`].
///
/// Transactions drained into an aborted candidate are not put back.
pub struct MiningEngine {
    chain: Arc<ChainStore>,
    mempool: Arc<Mempool>,
    state: Mutex<MiningState>,
    current: Mutex<CancellationToken>,
    worker: Mutex<()>,
}

impl MiningEngine {
    pub fn new(chain: Arc<ChainStore>, mempool: Arc<Mempool>) -> Self {
        Self {
            chain,
            mempool,
            state: Mutex::new(MiningState::Idle),
            current: Mutex::new(CancellationToken::new()),
            worker: Mutex::new(()),
        }
    }

    pub fn state(&self) -> MiningState {
        *self.state.lock()
    }

    fn set_state(&self, next: MiningState) {
        let mut state = self.state.lock();
        debug!(from = ?*state, to = ?next, "mining state");
        *state = next;
    }

    /// Stop the search in progress, if any. Observed within one hash.
    pub fn cancel_current(&self) {
        self.current.lock().cancel();
    }

    /// One full cycle: drain, build on the tip, search, submit. Blocks the
    /// calling thread for the whole search, so async callers should run it
    /// on a blocking pool.
    pub fn mine_once(&self) -> MiningOutcome {
        let _worker = self.worker.lock();
        self.set_state(MiningState::Idle);
        if self.mempool.is_empty() {
            return MiningOutcome::Idle;
        }

        // Install the token before reading the tip: any append after this
        // point cancels exactly this search.
        let cancel = CancellationToken::new();
        *self.current.lock() = cancel.clone();

        let transactions = self.mempool.drain();
        if transactions.is_empty() {
            return MiningOutcome::Idle;
        }
        let tip = self.chain.latest();
        let mut candidate = Block::new(tip.index + 1, now_secs(), transactions, tip.hash);

        self.set_state(MiningState::Mining);
        info!(
            index = candidate.index,
            txs = candidate.transactions.len(),
            difficulty = self.chain.difficulty(),
            "mining block"
        );

        let outcome = if candidate.mine(self.chain.difficulty(), &cancel) {
            self.submit(candidate)
        } else {
            info!(index = candidate.index, "mining cancelled");
            MiningOutcome::Aborted(AbortReason::Cancelled)
        };

        self.set_state(match outcome {
            MiningOutcome::Committed(_) => MiningState::Committed,
            _ => MiningState::Aborted,
        });
        outcome
    }

    fn submit(&self, candidate: Block) -> MiningOutcome {
        match self.chain.append_mined(candidate.clone()) {
            Ok(()) => MiningOutcome::Committed(candidate),
            Err(e) => {
                warn!(index = candidate.index, "mined block rejected: {e}");
                MiningOutcome::Aborted(AbortReason::Rejected(e))
            }
        }
    }
}
