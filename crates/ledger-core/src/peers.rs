use crate::notify::{ChangeNotifier, NodeEvent};
use parking_lot::RwLock;
use std::{collections::BTreeSet, sync::Arc};
use tracing::info;

/// Known peers, keyed by base URL. Only changes that actually alter the set
/// are published.
pub struct PeerSet {
    peers: RwLock<BTreeSet<String>>,
    notifier: Arc<ChangeNotifier>,
}

/// Trims whitespace and trailing slashes so `http://a/` and `http://a`
/// are the same peer.
pub fn normalize_peer(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    (!url.is_empty()).then(|| url.to_string())
}

impl PeerSet {
    pub fn new(notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            peers: RwLock::new(BTreeSet::new()),
            notifier,
        }
    }

    pub fn add(&self, url: &str) -> bool {
        self.extend([url]) == 1
    }

    /// Add several peers, publishing once if any were new. Returns the
    /// number added.
    pub fn extend<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (added, count) = {
            let mut peers = self.peers.write();
            let added = urls
                .into_iter()
                .filter_map(|u| normalize_peer(u.as_ref()))
                .filter(|u| peers.insert(u.clone()))
                .count();
            (added, peers.len())
        };
        if added > 0 {
            info!(added, count, "peer set updated");
            self.notifier.publish(&NodeEvent::PeersChanged { count });
        }
        added
    }

    pub fn remove(&self, url: &str) -> bool {
        let Some(url) = normalize_peer(url) else {
            return false;
        };
        let (removed, count) = {
            let mut peers = self.peers.write();
            (peers.remove(&url), peers.len())
        };
        if removed {
            self.notifier.publish(&NodeEvent::PeersChanged { count });
        }
        removed
    }

    pub fn contains(&self, url: &str) -> bool {
        normalize_peer(url).is_some_and(|u| self.peers.read().contains(&u))
    }

    pub fn list(&self) -> Vec<String> {
        self.peers.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
