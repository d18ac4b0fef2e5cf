/// Epoch parameters and the light cache
///
/// Every quantity here is a pure function of the block number: the epoch
/// selects cache and dataset sizes (node counts are kept prime for the
/// RandMemoHash construction) and a seed hash, and the seed fully determines
/// the cache contents. Dataset items are derived from the cache on demand.

use crate::common::hash_types::{Hash256, Node, NODE_BYTES, NODE_WORDS};
use crate::error::{Result, RifthashError};
use crate::fnv::fnv;
use crate::hashimoto::{hashimoto, PowOutput};
use crate::keccak::{keccak256, keccak512};
use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info};

/// Format revision, embedded in DAG file names
pub const REVISION: u32 = 23;
/// Dataset bytes at epoch 0
pub const DATASET_BYTES_INIT: u64 = 1 << 30;
/// Dataset growth per epoch
pub const DATASET_BYTES_GROWTH: u64 = 1 << 23;
/// Cache bytes at epoch 0
pub const CACHE_BYTES_INIT: u64 = 1 << 24;
/// Cache growth per epoch
pub const CACHE_BYTES_GROWTH: u64 = 1 << 17;
/// Blocks per epoch
pub const EPOCH_LENGTH: u64 = 30000;
/// Width of the hashimoto mix in bytes
pub const MIX_BYTES: usize = 128;
/// Width of one node in bytes
pub const HASH_BYTES: usize = NODE_BYTES;
/// Cache parents folded into each dataset item
pub const DATASET_PARENTS: u32 = 256;
/// RandMemoHash passes over the cache
pub const CACHE_ROUNDS: usize = 3;
/// Dataset reads per hashimoto run
pub const ACCESSES: usize = 64;

/// Epoch for a block number
pub fn get_epoch(block_number: u64) -> u64 {
    block_number / EPOCH_LENGTH
}

/// Cache size in bytes for the epoch of `block_number`.
///
/// The largest size at or below the epoch target whose node count is prime.
pub fn get_cache_size(block_number: u64) -> u64 {
    let mut size =
        CACHE_BYTES_INIT + CACHE_BYTES_GROWTH * get_epoch(block_number) - HASH_BYTES as u64;
    while !is_prime(size / HASH_BYTES as u64) {
        size -= 2 * HASH_BYTES as u64;
    }
    size
}

/// Full dataset size in bytes for the epoch of `block_number`.
///
/// The largest size at or below the epoch target whose 128-byte page count
/// is prime.
pub fn get_dataset_size(block_number: u64) -> u64 {
    let mut size =
        DATASET_BYTES_INIT + DATASET_BYTES_GROWTH * get_epoch(block_number) - MIX_BYTES as u64;
    while !is_prime(size / MIX_BYTES as u64) {
        size -= 2 * MIX_BYTES as u64;
    }
    size
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut i = 3;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

/// Seed hash for the epoch of `block_number`: Keccak-256 iterated from zero
/// once per elapsed epoch.
pub fn get_seedhash(block_number: u64) -> Hash256 {
    let mut seed = Hash256::default();
    for _ in 0..get_epoch(block_number) {
        seed = Hash256::from_bytes(keccak256(seed.as_bytes()));
    }
    seed
}

/// Light client handle: the per-epoch cache of 512-bit nodes.
///
/// Owns its node arena and is immutable after construction; any dataset item
/// can be derived from it without materializing the dataset.
pub struct LightCache {
    nodes: Vec<Node>,
    cache_size: u64,
    block_number: u64,
}

impl LightCache {
    /// Build the cache for `block_number`
    pub fn new(block_number: u64) -> Result<Self> {
        let mut light = Self::with_seed(get_cache_size(block_number), &get_seedhash(block_number))?;
        light.block_number = block_number;
        Ok(light)
    }

    /// Build a cache of `cache_size` bytes from an explicit seed.
    ///
    /// The size-derivation shortcut for callers that already know their
    /// parameters; `new` is the block-number front end.
    pub fn with_seed(cache_size: u64, seed: &Hash256) -> Result<Self> {
        if cache_size < HASH_BYTES as u64 || cache_size % HASH_BYTES as u64 != 0 {
            return Err(RifthashError::Invalid(format!(
                "cache size {} is not a positive multiple of {}",
                cache_size, HASH_BYTES
            )));
        }
        let n = (cache_size / HASH_BYTES as u64) as usize;
        info!(
            "building light cache: {} nodes ({} KB)",
            n,
            cache_size / 1024
        );

        let mut nodes: Vec<Node> = Vec::new();
        nodes
            .try_reserve_exact(n)
            .map_err(|_| RifthashError::NoMemory(cache_size))?;

        // Sequential fill from the seed
        nodes.push(Node::from_bytes(keccak512(seed.as_bytes())));
        for i in 1..n {
            let node = Node::from_bytes(keccak512(nodes[i - 1].as_bytes()));
            nodes.push(node);
        }

        // RandMemoHash rounds: each node is rehashed from its left neighbour
        // XOR a node picked by its own first word
        for round in 0..CACHE_ROUNDS {
            debug!("cache round {}/{}", round + 1, CACHE_ROUNDS);
            for i in 0..n {
                let left = (i + n - 1) % n;
                let picked = nodes[i].word(0) as usize % n;
                let mut data = [0u8; NODE_BYTES];
                for w in 0..NODE_WORDS {
                    LittleEndian::write_u32(
                        &mut data[w * 4..],
                        nodes[left].word(w) ^ nodes[picked].word(w),
                    );
                }
                nodes[i] = Node::from_bytes(keccak512(&data));
            }
        }

        Ok(Self {
            nodes,
            cache_size,
            block_number: 0,
        })
    }

    /// Block number this cache was built for (0 for `with_seed` caches)
    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Cache size in bytes
    pub fn cache_size(&self) -> u64 {
        self.cache_size
    }

    /// Derive dataset item `index` from the cache.
    ///
    /// Folds `DATASET_PARENTS` pseudo-randomly chosen cache nodes into the
    /// item with the FNV combiner; parent choice reads the evolving mix.
    pub fn calc_dataset_item(&self, index: u32) -> Node {
        let n = self.nodes.len() as u32;

        let mut init = self.nodes[(index % n) as usize];
        init.set_word(0, init.word(0) ^ index);
        let mut mix = Node::from_bytes(keccak512(init.as_bytes()));

        for p in 0..DATASET_PARENTS {
            let parent = &self.nodes[(fnv(index ^ p, mix.word(p as usize % NODE_WORDS)) % n) as usize];
            for w in 0..NODE_WORDS {
                mix.set_word(w, fnv(mix.word(w), parent.word(w)));
            }
        }

        Node::from_bytes(keccak512(mix.as_bytes()))
    }

    /// Hash `header_hash` and `nonce` against the dataset of this cache's
    /// block number, deriving items on demand.
    pub fn compute(&self, header_hash: &Hash256, nonce: u64) -> PowOutput {
        self.compute_with_size(get_dataset_size(self.block_number), header_hash, nonce)
    }

    /// As `compute`, against an explicit dataset size
    pub fn compute_with_size(&self, full_size: u64, header_hash: &Hash256, nonce: u64) -> PowOutput {
        hashimoto(full_size, header_hash, nonce, |index| {
            self.calc_dataset_item(index)
        })
    }
}
