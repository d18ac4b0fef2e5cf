/// Keccak-256 and Keccak-512 adapters
///
/// These are the legacy Keccak sponges (pre-NIST padding), not SHA-3.
/// Inputs are caller-ordered bytes, outputs are plain byte arrays.

use sha3::{Digest, Keccak256, Keccak512};

/// Keccak-256 of `data`
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Keccak-512 of `data`
pub fn keccak512(data: &[u8]) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&Keccak512::digest(data));
    out
}
