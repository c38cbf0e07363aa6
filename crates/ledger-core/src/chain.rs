//! The canonical chain: validation, append, wholesale replacement and read views.

use crate::{
    constants::{GENESIS_FROM, GENESIS_TIMESTAMP, GENESIS_TO, HASH_SIZE},
    notify::{ChangeNotifier, NodeEvent},
    pow::leading_zero_hex_digits,
    Block, Hash, Transaction,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// First of the four successor rules a candidate broke.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("index mismatch: expected {expected}, found {found}")]
    IndexMismatch { expected: u64, found: u64 },
    #[error("previous_hash does not match the predecessor's hash")]
    PreviousHashMismatch,
    #[error("stored hash does not match a recomputation of the block")]
    HashMismatch,
    #[error("insufficient work: {found} leading zero digits, {required} required")]
    InsufficientWork { required: usize, found: usize },
}

/// Why an append was refused. The chain is untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// A peer block that does not extend our tip; the sender is probably on
    /// another fork and a sync pass should follow.
    #[error("block {found} is not the next block (expected {expected})")]
    NotNextBlock { expected: u64, found: u64 },
    #[error("invalid block: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainValidityError {
    #[error("chain is empty")]
    Empty,
    #[error("genesis block does not match the canonical genesis")]
    GenesisMismatch,
    #[error("block {index} is invalid: {source}")]
    InvalidBlock {
        index: usize,
        #[source]
        source: ValidationError,
    },
}

/// Wire form of a full chain, as served to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainResponse {
    pub length: u64,
    pub chain: Vec<Block>,
}

/// The fixed first block of every chain.
pub fn genesis_block() -> Block {
    let placeholder = Transaction {
        from: GENESIS_FROM.to_string(),
        to: GENESIS_TO.to_string(),
        amount: 0,
        timestamp: GENESIS_TIMESTAMP,
    };
    Block::new(0, GENESIS_TIMESTAMP, vec![placeholder], [0u8; HASH_SIZE])
}

/// Checks `candidate` against `predecessor`, rules applied in order.
pub fn validate_successor(
    candidate: &Block,
    predecessor: &Block,
    difficulty: usize,
) -> Result<(), ValidationError> {
    let expected = predecessor.index.wrapping_add(1);
    if candidate.index != expected {
        return Err(ValidationError::IndexMismatch {
            expected,
            found: candidate.index,
        });
    }
    if candidate.previous_hash != predecessor.hash {
        return Err(ValidationError::PreviousHashMismatch);
    }
    if !candidate.has_valid_hash() {
        return Err(ValidationError::HashMismatch);
    }
    let found = leading_zero_hex_digits(&candidate.hash);
    if found < difficulty {
        return Err(ValidationError::InsufficientWork {
            required: difficulty,
            found,
        });
    }
    Ok(())
}

/// Owns the chain. Every structural change happens under one write lock
/// held only for validate-and-mutate; readers always see a whole chain.
pub struct ChainStore {
    blocks: RwLock<Vec<Block>>,
    difficulty: usize,
    genesis_hash: Hash,
    notifier: Arc<ChangeNotifier>,
}

impl ChainStore {
    pub fn new(difficulty: usize, notifier: Arc<ChangeNotifier>) -> Self {
        let genesis = genesis_block();
        Self {
            genesis_hash: genesis.hash,
            blocks: RwLock::new(vec![genesis]),
            difficulty,
            notifier,
        }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_hash
    }

    pub fn latest(&self) -> Block {
        let blocks = self.blocks.read();
        // Never empty: created with genesis, replaced only by validated chains.
        blocks[blocks.len() - 1].clone()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Length and tip hash read under the same lock.
    pub fn tip(&self) -> (usize, Hash) {
        let blocks = self.blocks.read();
        (blocks.len(), blocks[blocks.len() - 1].hash)
    }

    pub fn is_valid_successor(
        &self,
        candidate: &Block,
        predecessor: &Block,
    ) -> Result<(), ValidationError> {
        validate_successor(candidate, predecessor, self.difficulty)
    }

    /// Full audit of an arbitrary chain: canonical genesis first, then every
    /// adjacent pair.
    pub fn is_chain_valid(&self, chain: &[Block]) -> Result<(), ChainValidityError> {
        let genesis = chain.first().ok_or(ChainValidityError::Empty)?;
        if genesis.hash != self.genesis_hash || !genesis.has_valid_hash() {
            return Err(ChainValidityError::GenesisMismatch);
        }
        for (i, pair) in chain.windows(2).enumerate() {
            self.is_valid_successor(&pair[1], &pair[0])
                .map_err(|source| ChainValidityError::InvalidBlock {
                    index: i + 1,
                    source,
                })?;
        }
        Ok(())
    }

    /// Audit of the chain currently held.
    pub fn self_audit(&self) -> Result<(), ChainValidityError> {
        let blocks = self.blocks.read();
        self.is_chain_valid(&blocks)
    }

    /// Append a locally mined block. Publishes [`NodeEvent::BlockMined`].
    pub fn append_mined(&self, candidate: Block) -> Result<(), ChainError> {
        let block = self.append(candidate, false)?;
        info!(index = block.index, hash = %block.hash_hex(), "mined block appended");
        self.notifier.publish(&NodeEvent::BlockMined(block));
        Ok(())
    }

    /// Append a block pushed by a peer. Anything other than the immediate
    /// successor of our tip is refused without buffering.
    /// Publishes [`NodeEvent::BlockAccepted`].
    pub fn append_from_peer(&self, candidate: Block) -> Result<(), ChainError> {
        let block = self.append(candidate, true)?;
        info!(index = block.index, hash = %block.hash_hex(), "peer block appended");
        self.notifier.publish(&NodeEvent::BlockAccepted(block));
        Ok(())
    }

    fn append(&self, candidate: Block, from_peer: bool) -> Result<Block, ChainError> {
        let mut blocks = self.blocks.write();
        let tip = &blocks[blocks.len() - 1];
        let expected = tip.index.wrapping_add(1);
        if from_peer && candidate.index != expected {
            warn!(expected, found = candidate.index, "peer block is not the next block");
            return Err(ChainError::NotNextBlock {
                expected,
                found: candidate.index,
            });
        }
        if let Err(e) = self.is_valid_successor(&candidate, tip) {
            warn!(index = candidate.index, from_peer, "block rejected: {e}");
            return Err(e.into());
        }
        blocks.push(candidate.clone());
        Ok(candidate)
    }

    /// Install `candidate` if it is valid and still strictly longer than the
    /// local chain at the moment of the swap. Validation runs before the
    /// write lock is taken; an invalid candidate leaves the chain untouched.
    /// Publishes [`NodeEvent::ChainReplaced`] when it takes effect.
    pub fn replace_if_longer(&self, candidate: Vec<Block>) -> Result<bool, ChainValidityError> {
        self.is_chain_valid(&candidate)?;
        let (length, tip) = {
            let mut blocks = self.blocks.write();
            if candidate.len() <= blocks.len() {
                debug!(
                    local = blocks.len(),
                    candidate = candidate.len(),
                    "candidate no longer longer than local chain"
                );
                return Ok(false);
            }
            *blocks = candidate;
            (blocks.len(), blocks[blocks.len() - 1].clone())
        };
        info!(length, tip = %tip.hash_hex(), "chain replaced");
        self.notifier.publish(&NodeEvent::ChainReplaced { length, tip });
        Ok(true)
    }

    /// Snapshot of the whole chain in wire form.
    pub fn export(&self) -> ChainResponse {
        let chain = self.blocks.read().clone();
        ChainResponse {
            length: chain.len() as u64,
            chain,
        }
    }

    /// Received minus sent over the whole chain, recomputed on each call.
    pub fn balance_of(&self, address: &str) -> i128 {
        let blocks = self.blocks.read();
        blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .fold(0i128, |balance, tx| {
                let mut balance = balance;
                if tx.to == address {
                    balance += i128::from(tx.amount);
                }
                if tx.from == address {
                    balance -= i128::from(tx.amount);
                }
                balance
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CancellationToken;

    const DIFFICULTY: usize = 1;

    fn store() -> ChainStore {
        ChainStore::new(DIFFICULTY, Arc::new(ChangeNotifier::new()))
    }

    fn tx(from: &str, to: &str, amount: u64) -> Transaction {
        Transaction {
            from: from.to_string(),
            to: to.to_string(),
            amount,
            timestamp: 1_600_000_000,
        }
    }

    fn mined_successor(prev: &Block, txs: Vec<Transaction>) -> Block {
        let mut block = Block::new(prev.index + 1, prev.timestamp + 1, txs, prev.hash);
        assert!(block.mine(DIFFICULTY, &CancellationToken::new()));
        block
    }

    fn grow(store: &ChainStore, n: usize) {
        for i in 0..n {
            let next = mined_successor(&store.latest(), vec![tx("A", "B", i as u64)]);
            store.append_mined(next).unwrap();
        }
    }

    #[test]
    fn starts_at_genesis() {
        let store = store();
        assert_eq!(store.len(), 1);
        let genesis = store.latest();
        assert_eq!(genesis, genesis_block());
        assert_eq!(genesis.previous_hash, [0u8; 32]);
        assert_eq!(genesis.transactions.len(), 1);
        assert_eq!(store.genesis_hash(), genesis.hash);
    }

    #[test]
    fn repeated_valid_appends_stay_valid() {
        let store = store();
        grow(&store, 5);
        assert_eq!(store.len(), 6);
        assert!(store.self_audit().is_ok());
    }

    #[test]
    fn successor_rules_fail_in_order() {
        let store = store();
        let genesis = store.latest();
        let good = mined_successor(&genesis, vec![tx("A", "B", 1)]);
        assert!(store.is_valid_successor(&good, &genesis).is_ok());

        let mut bad = good.clone();
        bad.index = 5;
        bad.previous_hash = [9u8; 32];
        assert_eq!(
            store.is_valid_successor(&bad, &genesis),
            Err(ValidationError::IndexMismatch {
                expected: 1,
                found: 5
            })
        );

        let mut bad = good.clone();
        bad.previous_hash = [9u8; 32];
        assert_eq!(
            store.is_valid_successor(&bad, &genesis),
            Err(ValidationError::PreviousHashMismatch)
        );

        let mut bad = good.clone();
        bad.transactions[0].amount = 1_000;
        assert_eq!(
            store.is_valid_successor(&bad, &genesis),
            Err(ValidationError::HashMismatch)
        );

        // Consistent hash but no work done.
        let mut lazy = Block::new(1, genesis.timestamp + 1, vec![], genesis.hash);
        while leading_zero_hex_digits(&lazy.hash) >= DIFFICULTY {
            lazy.nonce += 1;
            lazy.hash = lazy.calculate_hash();
        }
        assert_eq!(
            store.is_valid_successor(&lazy, &genesis),
            Err(ValidationError::InsufficientWork {
                required: DIFFICULTY,
                found: 0
            })
        );
    }

    #[test]
    fn tampering_fails_at_that_index() {
        let store = store();
        grow(&store, 4);
        let chain = store.export().chain;

        let edits: Vec<Box<dyn Fn(&mut Block)>> = vec![
            Box::new(|b| b.transactions[0].amount += 1),
            Box::new(|b| b.timestamp += 1),
            Box::new(|b| b.nonce += 1),
            Box::new(|b| b.previous_hash = [7u8; 32]),
        ];
        for edit in &edits {
            let mut tampered = chain.clone();
            edit(&mut tampered[2]);
            match store.is_chain_valid(&tampered) {
                Err(ChainValidityError::InvalidBlock { index, .. }) => assert_eq!(index, 2),
                other => panic!("expected failure at block 2, got {other:?}"),
            }
        }
    }

    #[test]
    fn tampered_genesis_is_rejected() {
        let store = store();
        grow(&store, 1);
        let mut chain = store.export().chain;
        chain[0].transactions[0].amount = 1_000_000;
        assert_eq!(
            store.is_chain_valid(&chain),
            Err(ChainValidityError::GenesisMismatch)
        );
        assert_eq!(store.is_chain_valid(&[]), Err(ChainValidityError::Empty));
    }

    #[test]
    fn peer_block_must_be_next() {
        let store = store();
        grow(&store, 2);
        let (len_before, tip_before) = store.tip();

        let tip = store.latest();
        let mut skip = mined_successor(&tip, vec![]);
        skip.index += 1;
        assert!(skip.mine(DIFFICULTY, &CancellationToken::new()));
        assert_eq!(
            store.append_from_peer(skip),
            Err(ChainError::NotNextBlock {
                expected: 3,
                found: 4
            })
        );

        let genesis = genesis_block();
        let stale = mined_successor(&genesis, vec![]);
        assert!(matches!(
            store.append_from_peer(stale),
            Err(ChainError::NotNextBlock { .. })
        ));
        assert_eq!(store.tip(), (len_before, tip_before));
    }

    #[test]
    fn rejected_append_leaves_chain_unchanged() {
        let store = store();
        let genesis = store.latest();
        let mut bad = mined_successor(&genesis, vec![tx("A", "B", 1)]);
        bad.transactions[0].amount = 2;
        assert!(matches!(
            store.append_mined(bad),
            Err(ChainError::Invalid(ValidationError::HashMismatch))
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.latest(), genesis);
    }

    #[test]
    fn replace_requires_strictly_longer() {
        let store = store();
        grow(&store, 2);
        let same = store.export().chain;
        assert_eq!(store.replace_if_longer(same.clone()), Ok(false));

        let other = ChainStore::new(DIFFICULTY, Arc::new(ChangeNotifier::new()));
        grow(&other, 4);
        let longer = other.export().chain;
        assert_eq!(store.replace_if_longer(longer.clone()), Ok(true));
        assert_eq!(store.export().chain, longer);
    }

    #[test]
    fn invalid_longer_chain_is_not_installed() {
        let notifier = Arc::new(ChangeNotifier::new());
        let mut events = notifier.channel(8);
        let store = ChainStore::new(DIFFICULTY, notifier);
        grow(&store, 1);
        let before = store.export();
        while events.try_recv().is_ok() {}

        let foreign: Vec<Block> = (0..3).map(|i| Block::new(i, 0, vec![], [9u8; 32])).collect();
        assert_eq!(
            store.replace_if_longer(foreign),
            Err(ChainValidityError::GenesisMismatch)
        );

        let other = ChainStore::new(DIFFICULTY, Arc::new(ChangeNotifier::new()));
        grow(&other, 3);
        let mut tampered = other.export().chain;
        tampered[2].timestamp += 1;
        assert!(matches!(
            store.replace_if_longer(tampered),
            Err(ChainValidityError::InvalidBlock { index: 2, .. })
        ));

        assert_eq!(store.export(), before);
        assert!(store.self_audit().is_ok());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn balances() {
        let store = store();
        let next = mined_successor(
            &store.latest(),
            vec![tx("A", "B", 10), tx("B", "C", 3), tx("A", "A", 4)],
        );
        store.append_mined(next).unwrap();
        assert_eq!(store.balance_of("nobody"), 0);
        assert_eq!(store.balance_of("A"), -10);
        assert_eq!(store.balance_of("B"), 7);
        assert_eq!(store.balance_of("C"), 3);
        assert_eq!(store.balance_of("Genesis"), 0);
    }

    #[test]
    fn export_reports_length() {
        let store = store();
        grow(&store, 3);
        let exported = store.export();
        assert_eq!(exported.length, 4);
        assert_eq!(exported.chain.len(), 4);
        let json = serde_json::to_value(&exported).unwrap();
        assert_eq!(json["length"], 4);
    }

    #[test]
    fn appends_publish_events() {
        let notifier = Arc::new(ChangeNotifier::new());
        let mut events = notifier.channel(8);
        let store = ChainStore::new(DIFFICULTY, notifier);
        let next = mined_successor(&store.latest(), vec![]);
        store.append_mined(next.clone()).unwrap();
        assert_eq!(events.try_recv().unwrap(), NodeEvent::BlockMined(next));
        let next = mined_successor(&store.latest(), vec![]);
        store.append_from_peer(next.clone()).unwrap();
        assert_eq!(events.try_recv().unwrap(), NodeEvent::BlockAccepted(next));
        assert!(events.try_recv().is_err());
    }
}
