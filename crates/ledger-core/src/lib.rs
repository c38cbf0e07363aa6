use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod constants;
pub mod mempool;
pub mod mine;
pub mod node;
pub mod notify;
pub mod peers;
pub mod sync;

use constants::{BLOCK_DOMAIN_TAG, CANONICAL_ENCODING_VERSION, HASH_SIZE};

pub use chain::{ChainError, ChainResponse, ChainStore, ChainValidityError, ValidationError};
pub use mempool::Mempool;
pub use mine::{AbortReason, MiningEngine, MiningOutcome, MiningState};
pub use node::Node;
pub use notify::{ChangeNotifier, NodeEvent};
pub use peers::PeerSet;
pub use sync::{PeerChain, PeerClient, PeerError, SyncReport};
pub use tokio_util::sync::CancellationToken;

pub type Hash = [u8; HASH_SIZE];

/// Current wall-clock time in Unix seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub timestamp: u64,
}

impl Transaction {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: u64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
            timestamp: now_secs(),
        }
    }

    /// Appends the version 1 canonical form: keys in sorted order
    /// (amount, from, timestamp, to), integers as u64 LE, text as a u64 LE
    /// byte length followed by UTF-8.
    fn encode_canonical(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.amount.to_le_bytes());
        encode_str(out, &self.from);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        encode_str(out, &self.to);
    }
}

fn encode_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// A hash-linked block. `hash` always covers every other field; anything that
/// edits a field without re-mining leaves a block that fails validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    #[serde(with = "hex_hash")]
    pub previous_hash: Hash,
    pub nonce: u64,
    #[serde(with = "hex_hash")]
    pub hash: Hash,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: Hash,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: [0u8; HASH_SIZE],
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Canonical encoding split around the nonce so the miner can reuse
    /// both halves across iterations. Sorted key order puts `index` before
    /// `nonce` and everything else after it.
    fn canonical_parts(&self) -> (Vec<u8>, Vec<u8>) {
        let mut head = Vec::with_capacity(BLOCK_DOMAIN_TAG.len() + 1 + 8);
        head.extend_from_slice(BLOCK_DOMAIN_TAG);
        head.push(CANONICAL_ENCODING_VERSION);
        head.extend_from_slice(&self.index.to_le_bytes());

        let mut tail = Vec::with_capacity(HASH_SIZE + 8 + 8 + self.transactions.len() * 48);
        tail.extend_from_slice(&self.previous_hash);
        tail.extend_from_slice(&self.timestamp.to_le_bytes());
        tail.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            tx.encode_canonical(&mut tail);
        }
        (head, tail)
    }

    /// The exact bytes hashed to produce `hash`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let (mut bytes, tail) = self.canonical_parts();
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&tail);
        bytes
    }

    pub fn calculate_hash(&self) -> Hash {
        let (head, tail) = self.canonical_parts();
        digest_with_nonce(&head, self.nonce, &tail)
    }

    /// True when the stored hash matches a recomputation from the fields.
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Searches nonces upward from the current one until the hash has at
    /// least `difficulty` leading zero hex digits. The token is polled once
    /// per nonce; on cancellation the block is left untouched and `false` is
    /// returned. There is no iteration cap: a target above 64 digits never
    /// succeeds and only stops when cancelled.
    pub fn mine(&mut self, difficulty: usize, cancel: &CancellationToken) -> bool {
        let (head, tail) = self.canonical_parts();
        let mut nonce = self.nonce;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let hash = digest_with_nonce(&head, nonce, &tail);
            if pow::meets_difficulty(&hash, difficulty) {
                self.nonce = nonce;
                self.hash = hash;
                return true;
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}

fn digest_with_nonce(head: &[u8], nonce: u64, tail: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(head);
    hasher.update(nonce.to_le_bytes());
    hasher.update(tail);
    hasher.finalize().into()
}

pub mod pow {
    use super::{Block, CancellationToken, Hash};

    /// Number of leading `'0'` characters in the lowercase hex form of `hash`.
    pub fn leading_zero_hex_digits(hash: &Hash) -> usize {
        let mut total = 0usize;
        for b in hash {
            if *b == 0 {
                total += 2;
            } else {
                if *b < 0x10 {
                    total += 1;
                }
                break;
            }
        }
        total
    }

    pub fn meets_difficulty(hash: &Hash, difficulty: usize) -> bool {
        leading_zero_hex_digits(hash) >= difficulty
    }

    /// Mine `block` to `difficulty`, returning `None` if cancelled first.
    pub fn mine_block(
        mut block: Block,
        difficulty: usize,
        cancel: &CancellationToken,
    ) -> Option<Block> {
        block.mine(difficulty, cancel).then_some(block)
    }
}

/// Serde adapter rendering a [`Hash`] as 64 lowercase hex characters.
pub mod hex_hash {
    use super::{Hash, HASH_SIZE};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; HASH_SIZE];
        hex::decode_to_slice(&s, &mut out).map_err(D::Error::custom)?;
        Ok(out)
    }
}
