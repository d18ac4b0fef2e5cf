/// The hashimoto mixing loop and difficulty checks
///
/// The hot path of both mining and verification. It only ever reads memory:
/// dataset access is abstracted behind a `lookup` closure so light clients
/// can derive items on demand while full clients read the mapped dataset.

use crate::common::hash_types::{Hash256, Node, NODE_WORDS};
use crate::dag::{ACCESSES, MIX_BYTES};
use crate::fnv::fnv;
use crate::keccak::{keccak256, keccak512};
use byteorder::{ByteOrder, LittleEndian};

/// 32-bit words in the mix buffer
const MIX_WORDS: usize = MIX_BYTES / 4;
/// Consecutive dataset nodes per access
const MIX_NODES: usize = MIX_WORDS / NODE_WORDS;

/// Outcome of one hash attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowOutput {
    /// Sealing hash, compared against the boundary
    pub result: Hash256,
    /// Mix digest, carried in block headers for quick pre-verification
    pub mix_hash: Hash256,
    /// False when the inputs were unusable; no partial result is surfaced
    pub success: bool,
}

impl PowOutput {
    pub(crate) fn failure() -> Self {
        Self {
            result: Hash256::default(),
            mix_hash: Hash256::default(),
            success: false,
        }
    }
}

fn seed_node(header_hash: &Hash256, nonce: u64) -> [u8; 64] {
    let mut input = [0u8; 40];
    input[..32].copy_from_slice(header_hash.as_bytes());
    LittleEndian::write_u64(&mut input[32..], nonce);
    keccak512(&input)
}

/// Run the mixing loop over a dataset of `full_size` bytes.
///
/// `lookup` returns dataset item `index`; each of the `ACCESSES` rounds
/// fetches one 128-byte page (two consecutive items) chosen by the FNV
/// combiner and folds it into the mix word by word.
pub fn hashimoto<F>(full_size: u64, header_hash: &Hash256, nonce: u64, lookup: F) -> PowOutput
where
    F: Fn(u32) -> Node,
{
    if full_size == 0 || full_size % MIX_BYTES as u64 != 0 {
        return PowOutput::failure();
    }
    let num_pages = (full_size / MIX_BYTES as u64) as u32;

    let seed = Node::from_bytes(seed_node(header_hash, nonce));

    // 128-byte working buffer, initialized by replicating the seed
    let mut mix = [0u32; MIX_WORDS];
    for (w, slot) in mix.iter_mut().enumerate() {
        *slot = seed.word(w % NODE_WORDS);
    }

    for a in 0..ACCESSES as u32 {
        let page = fnv(seed.word(0) ^ a, mix[a as usize % MIX_WORDS]) % num_pages;
        for part in 0..MIX_NODES {
            let node = lookup(page * MIX_NODES as u32 + part as u32);
            for w in 0..NODE_WORDS {
                let m = part * NODE_WORDS + w;
                mix[m] = fnv(mix[m], node.word(w));
            }
        }
    }

    // Fold 32 words down to 8
    let mut cmix = [0u8; 32];
    for i in 0..MIX_WORDS / 4 {
        let folded = fnv(
            fnv(fnv(mix[4 * i], mix[4 * i + 1]), mix[4 * i + 2]),
            mix[4 * i + 3],
        );
        LittleEndian::write_u32(&mut cmix[4 * i..], folded);
    }

    let mut sealed = [0u8; 96];
    sealed[..64].copy_from_slice(seed.as_bytes());
    sealed[64..].copy_from_slice(&cmix);

    PowOutput {
        result: Hash256::from_bytes(keccak256(&sealed)),
        mix_hash: Hash256::from_bytes(cmix),
        success: true,
    }
}

/// `hash <= boundary`, both big-endian
pub fn check_difficulty(hash: &Hash256, boundary: &Hash256) -> bool {
    hash.meets_boundary(boundary)
}

/// Recompute the sealing hash from a caller-supplied mix digest, skipping
/// the dataset entirely.
pub fn quick_hash(header_hash: &Hash256, nonce: u64, mix_hash: &Hash256) -> Hash256 {
    let seed = seed_node(header_hash, nonce);
    let mut sealed = [0u8; 96];
    sealed[..64].copy_from_slice(&seed);
    sealed[64..].copy_from_slice(mix_hash.as_bytes());
    Hash256::from_bytes(keccak256(&sealed))
}

/// Cheap pre-verification for validators.
///
/// Trusts the submitted mix digest only enough to reject headers whose
/// sealing hash cannot meet the boundary; full verification must still
/// recompute the mix.
pub fn quick_check_difficulty(
    header_hash: &Hash256,
    nonce: u64,
    mix_hash: &Hash256,
    boundary: &Hash256,
) -> bool {
    quick_hash(header_hash, nonce, mix_hash).meets_boundary(boundary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::LightCache;
    use once_cell::sync::Lazy;

    // Synthetic sizes keep the unit tests fast; the mixing loop is size-blind
    const TEST_CACHE_SIZE: u64 = 1024;
    const TEST_FULL_SIZE: u64 = 128 * 61;

    static TEST_LIGHT: Lazy<LightCache> = Lazy::new(|| {
        LightCache::with_seed(TEST_CACHE_SIZE, &Hash256::from_bytes([42u8; 32])).unwrap()
    });

    #[test]
    fn test_hashimoto_rejects_bad_sizes() {
        let header = Hash256::default();
        assert!(!hashimoto(0, &header, 0, |_| Node::default()).success);
        assert!(!hashimoto(100, &header, 0, |_| Node::default()).success);
    }

    #[test]
    fn test_hashimoto_is_deterministic() {
        let header = Hash256::from_bytes([0xFF; 32]);
        let a = TEST_LIGHT.compute_with_size(TEST_FULL_SIZE, &header, 0);
        let b = TEST_LIGHT.compute_with_size(TEST_FULL_SIZE, &header, 0);
        assert!(a.success);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hashimoto_depends_on_nonce_and_header() {
        let header = Hash256::from_bytes([0xFF; 32]);
        let base = TEST_LIGHT.compute_with_size(TEST_FULL_SIZE, &header, 0);
        let other_nonce = TEST_LIGHT.compute_with_size(TEST_FULL_SIZE, &header, 1);
        assert_ne!(base.result, other_nonce.result);

        let other_header =
            TEST_LIGHT.compute_with_size(TEST_FULL_SIZE, &Hash256::default(), 0);
        assert_ne!(base.result, other_header.result);
    }

    #[test]
    fn test_quick_hash_matches_full_mix() {
        let header = Hash256::from_bytes([0xFF; 32]);
        for nonce in [0u64, 1, 0xDEAD_BEEF] {
            let out = TEST_LIGHT.compute_with_size(TEST_FULL_SIZE, &header, nonce);
            assert_eq!(quick_hash(&header, nonce, &out.mix_hash), out.result);
        }
    }

    #[test]
    fn test_quick_check_agrees_with_check() {
        let header = Hash256::from_bytes([0xFF; 32]);
        let out = TEST_LIGHT.compute_with_size(TEST_FULL_SIZE, &header, 7);

        // Boundary exactly at the result: both accept
        assert!(check_difficulty(&out.result, &out.result));
        assert!(quick_check_difficulty(&header, 7, &out.mix_hash, &out.result));

        // Boundary just below the result: both reject
        let mut below = *out.result.as_bytes();
        let last = below.iter().rposition(|&b| b != 0).unwrap();
        below[last] -= 1;
        let below = Hash256::from_bytes(below);
        assert_eq!(
            check_difficulty(&out.result, &below),
            quick_check_difficulty(&header, 7, &out.mix_hash, &below)
        );
        assert!(!check_difficulty(&out.result, &below));
    }

    #[test]
    fn test_quick_check_rejects_forged_mix() {
        let header = Hash256::from_bytes([0xFF; 32]);
        let out = TEST_LIGHT.compute_with_size(TEST_FULL_SIZE, &header, 7);
        let forged = Hash256::from_bytes([0x55; 32]);
        assert_ne!(quick_hash(&header, 7, &forged), out.result);
    }
}
