/// SHA-256 digest length in bytes.
pub const HASH_SIZE: usize = 32;

/// Domain tag prefixed to every canonical block encoding.
pub const BLOCK_DOMAIN_TAG: &[u8; 9] = b"LGR-BLOCK";
/// Bump whenever the canonical byte layout changes; nodes on different
/// versions will not agree on block hashes.
pub const CANONICAL_ENCODING_VERSION: u8 = 1;

pub const GENESIS_TIMESTAMP: u64 = 1_672_531_200;
pub const GENESIS_FROM: &str = "System";
pub const GENESIS_TO: &str = "Genesis";

/// Leading zero hex digits required by default.
pub const DEFAULT_DIFFICULTY: usize = 3;
