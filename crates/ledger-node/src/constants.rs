use std::time::Duration;

/// Upper bound on any single call to a peer.
pub(crate) const PEER_TIMEOUT: Duration = Duration::from_secs(3);
/// Capacity of the event channel feeding the peer broadcaster.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;
