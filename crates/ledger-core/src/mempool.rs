use crate::Transaction;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::debug;

#[derive(Default)]
struct Inner {
    pending: Vec<Transaction>,
    seen: HashSet<String>,
}

/// Pending transactions in arrival order. Enqueue and drain share one lock,
/// so a concurrent enqueue lands either before or after a drain, never both
/// and never neither.
#[derive(Default)]
pub struct Mempool {
    inner: Mutex<Inner>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `tx` unless `dedup_key` was seen before. Keys are remembered for
    /// the lifetime of the node, including after the transaction is mined.
    pub fn submit(&self, tx: Transaction, dedup_key: &str) -> bool {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(dedup_key.to_string()) {
            debug!(dedup_key, "duplicate transaction ignored");
            return false;
        }
        inner.pending.push(tx);
        true
    }

    /// Queue without deduplication.
    pub fn push(&self, tx: Transaction) {
        self.inner.lock().pending.push(tx);
    }

    /// Remove and return everything pending as one operation.
    pub fn drain(&self) -> Vec<Transaction> {
        std::mem::take(&mut self.inner.lock().pending)
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.inner.lock().pending.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }
}
