//! Rifthash - memory-hard proof-of-work hashing
//!
//! Given a block number, a header hash and a nonce, the algorithm produces a
//! 256-bit result hash and a 256-bit mix digest; a nonce is valid when the
//! result, read as a big-endian integer, is at or below the target boundary
//! `2^256 / difficulty`.
//!
//! Light clients build only the per-epoch cache ([`LightCache`]) and derive
//! dataset items on demand; full clients materialize the multi-gigabyte
//! dataset into a memory-mapped file ([`FullDataset`]) once per epoch and
//! read it directly.

pub mod common;
pub mod dag;
pub mod dataset;
pub mod error;
pub mod fnv;
pub mod hashimoto;
pub mod keccak;

// Re-export main types
pub use common::hash_types::{boundary_to_difficulty, difficulty_to_boundary, Hash256, Node};
pub use dag::{
    get_cache_size, get_dataset_size, get_epoch, get_seedhash, LightCache, EPOCH_LENGTH, REVISION,
};
pub use dataset::{compute_full_data, dag_file_name, FullDataset, DAG_MAGIC};
pub use error::{Result, RifthashError};
pub use hashimoto::{check_difficulty, hashimoto, quick_check_difficulty, quick_hash, PowOutput};
