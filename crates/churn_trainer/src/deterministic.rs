//! Deterministic utilities for reproducible training
//!
//! Seed derivation for independent per-trial / per-round RNG streams and
//! tie-breaking for split selection, so identical inputs and seeds always
//! produce identical models.

use rand::rngs::StdRng;
use rand::SeedableRng;

const PRIME1: u64 = 0x9E37_79B1_85EB_CA87;
const PRIME2: u64 = 0xC2B2_AE3D_27D4_EB4F;
const PRIME3: u64 = 0x1656_67B1_9E37_79F9;
const PRIME5: u64 = 0x85EB_CA77_C2B2_AE63;

/// Derive an independent seed for `stream` from a master seed
///
/// xxhash64-style avalanche over the pair so neighbouring stream numbers
/// map to unrelated seeds.
pub fn derive_seed(master: u64, stream: u64) -> u64 {
    let mut h = master.wrapping_add(PRIME5);

    h = h.wrapping_add(stream.wrapping_mul(PRIME3));
    h = h.rotate_left(17).wrapping_mul(PRIME2);

    h ^= h >> 33;
    h = h.wrapping_mul(PRIME1);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 32;

    h
}

/// Seeded RNG for a derived stream
pub fn stream_rng(master: u64, stream: u64) -> StdRng {
    StdRng::seed_from_u64(derive_seed(master, stream))
}

/// Deterministic tie-breaker for split selection
///
/// Among splits with equal gain the lowest `(feature_idx, bin, node_id)`
/// wins, independent of the order parallel scans finish in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub bin: u32,
    pub node_id: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, bin: u32, node_id: usize) -> Self {
        Self {
            feature_idx,
            bin,
            node_id,
        }
    }
}
