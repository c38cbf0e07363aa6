#![allow(dead_code)]

use ledger_core::{
    chain::genesis_block, pow, Block, CancellationToken, MiningOutcome, MiningState, Node,
    PeerChain, PeerClient, PeerError, Transaction,
};
use std::{collections::HashMap, thread, time::Duration};

/// High enough that a local search will not finish while a test runs.
pub const HARD_DIFFICULTY: usize = 6;

pub fn tx(from: &str, to: &str, amount: u64) -> Transaction {
    Transaction {
        from: from.to_string(),
        to: to.to_string(),
        amount,
        timestamp: 1_600_000_000,
    }
}

/// Mine a successor of `prev` carrying `txs`.
pub fn mined_successor(prev: &Block, txs: Vec<Transaction>, difficulty: usize) -> Block {
    let mut block = Block::new(prev.index + 1, prev.timestamp + 1, txs, prev.hash);
    assert!(block.mine(difficulty, &CancellationToken::new()));
    block
}

/// Grow `node` by `n` locally mined blocks.
pub fn grow(node: &Node, n: usize, tag: &str) {
    for i in 0..n {
        node.mempool().push(tx(tag, "sink", i as u64 + 1));
        assert!(matches!(
            node.mine_once(),
            ledger_core::MiningOutcome::Committed(_)
        ));
    }
}

/// Successor of genesis meeting [`HARD_DIFFICULTY`]; the nonce was searched
/// ahead of time.
pub fn hard_successor_of_genesis() -> Block {
    let genesis = genesis_block();
    let timestamp = genesis.timestamp + 60;
    let payment = Transaction {
        from: "Alice".to_string(),
        to: "Bob".to_string(),
        amount: 5,
        timestamp,
    };
    let mut block = Block::new(1, timestamp, vec![payment], genesis.hash);
    block.nonce = 4_191_474;
    block.hash = block.calculate_hash();
    assert!(pow::meets_difficulty(&block.hash, HARD_DIFFICULTY));
    block
}

/// Queue one transaction and run `mine_once` on a worker thread, returning
/// once the nonce search is under way.
pub fn start_mining(node: &Node) -> thread::JoinHandle<MiningOutcome> {
    node.mempool().push(tx("M", "sink", 1));
    let worker = {
        let node = node.clone();
        thread::spawn(move || node.mine_once())
    };
    while node.miner().state() != MiningState::Mining {
        thread::sleep(Duration::from_millis(1));
    }
    worker
}

/// What a fake peer answers to a chain request.
pub enum Answer {
    Chain(PeerChain),
    Down,
    Garbage,
}

pub fn answer_from(node: &Node) -> Answer {
    Answer::Chain(to_peer_chain(node.export_chain().chain))
}

pub fn to_peer_chain(chain: Vec<Block>) -> PeerChain {
    PeerChain {
        length: chain.len() as u64,
        chain: chain
            .into_iter()
            .map(|b| serde_json::to_value(b).expect("block to json"))
            .collect(),
    }
}

/// In-process stand-in for the HTTP peer client.
#[derive(Default)]
pub struct FakeNetwork {
    answers: HashMap<String, Answer>,
}

impl FakeNetwork {
    pub fn with(mut self, peer: &str, answer: Answer) -> Self {
        self.answers.insert(peer.to_string(), answer);
        self
    }
}

impl PeerClient for FakeNetwork {
    async fn fetch_chain(&self, peer: &str) -> Result<PeerChain, PeerError> {
        match self.answers.get(peer) {
            Some(Answer::Chain(chain)) => Ok(chain.clone()),
            Some(Answer::Garbage) => Err(PeerError::Malformed {
                peer: peer.to_string(),
                message: "expected value at line 1 column 1".to_string(),
            }),
            Some(Answer::Down) | None => Err(PeerError::Network {
                peer: peer.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}
