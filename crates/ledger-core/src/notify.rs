//! Post-commit fan-out of node state changes.

use crate::Block;
use anyhow::anyhow;
use parking_lot::RwLock;
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A locally mined block joined the chain; relay it to peers.
    BlockMined(Block),
    /// A block pushed by a peer joined the chain.
    BlockAccepted(Block),
    /// The whole chain was swapped for a longer one during sync.
    ChainReplaced { length: usize, tip: Block },
    /// The peer set gained or lost members.
    PeersChanged { count: usize },
}

type Callback = dyn Fn(&NodeEvent) -> anyhow::Result<()> + Send + Sync;

struct Subscriber {
    name: String,
    callback: Box<Callback>,
}

/// Ordered list of subscribers, invoked synchronously after each committed
/// mutation. A failing or panicking subscriber is logged and skipped; it never
/// stops the others and never undoes the mutation.
#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(&NodeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(Subscriber {
            name: name.into(),
            callback: Box::new(callback),
        }));
    }

    /// Register a subscriber that forwards into a bounded channel. Sending
    /// never blocks the mutator: when the channel is full the event is
    /// dropped for this subscriber and logged.
    pub fn channel(&self, capacity: usize) -> mpsc::Receiver<NodeEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.subscribe("channel", move |event| {
            tx.try_send(event.clone())
                .map_err(|e| anyhow!("event channel unavailable: {e}"))
        });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `event` to every subscriber in registration order. Returns
    /// how many subscribers failed.
    pub fn publish(&self, event: &NodeEvent) -> usize {
        // Snapshot so callbacks may subscribe without deadlocking.
        let subscribers = self.subscribers.read().clone();
        let mut failures = 0;
        for sub in subscribers {
            match catch_unwind(AssertUnwindSafe(|| (sub.callback)(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(subscriber = %sub.name, "subscriber failed: {e:#}");
                }
                Err(_) => {
                    failures += 1;
                    warn!(subscriber = %sub.name, "subscriber panicked");
                }
            }
        }
        failures
    }
}
