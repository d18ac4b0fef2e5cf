/// Hash and node types used by the hashing engine

use byteorder::{ByteOrder, LittleEndian};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, RifthashError};

/// Bytes in one dataset/cache node (512 bits)
pub const NODE_BYTES: usize = 64;

/// 32-bit words in one node
pub const NODE_WORDS: usize = NODE_BYTES / 4;

/// 256-bit hash (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from slice (must be 32 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != 32 {
            return Err(RifthashError::Invalid(format!(
                "Hash256 requires exactly 32 bytes, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(hex: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        Self::from_slice(&bytes).map_err(|_| hex::FromHexError::InvalidStringLength)
    }

    /// Check whether this hash is at or below the boundary `2^256 / difficulty`.
    ///
    /// Both values are interpreted as big-endian 256-bit integers, byte 0
    /// most significant.
    pub fn meets_boundary(&self, boundary: &Hash256) -> bool {
        for i in 0..32 {
            if self.0[i] == boundary.0[i] {
                continue;
            }
            return self.0[i] < boundary.0[i];
        }
        true
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash256 {
    fn default() -> Self {
        Self([0u8; 32])
    }
}

/// A 512-bit cache/dataset node.
///
/// Stored as a plain byte buffer; all mixing arithmetic goes through the
/// little-endian 32-bit word accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node([u8; NODE_BYTES]);

impl Node {
    /// Create from a 64-byte array
    pub fn from_bytes(bytes: [u8; NODE_BYTES]) -> Self {
        Self(bytes)
    }

    /// Create from a 64-byte slice
    pub fn from_slice(slice: &[u8]) -> Self {
        let mut bytes = [0u8; NODE_BYTES];
        bytes.copy_from_slice(slice);
        Self(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; NODE_BYTES] {
        &self.0
    }

    /// Read word `i` (little-endian)
    #[inline]
    pub fn word(&self, i: usize) -> u32 {
        LittleEndian::read_u32(&self.0[i * 4..])
    }

    /// Write word `i` (little-endian)
    #[inline]
    pub fn set_word(&mut self, i: usize, value: u32) {
        LittleEndian::write_u32(&mut self.0[i * 4..], value);
    }
}

impl Default for Node {
    fn default() -> Self {
        Self([0u8; NODE_BYTES])
    }
}

fn max_target() -> BigUint {
    (BigUint::one() << 256usize) - 1u32
}

/// Convert a difficulty to its boundary `(2^256 - 1) / difficulty`,
/// rendered as a big-endian hash. A zero difficulty is rejected.
pub fn difficulty_to_boundary(difficulty: &BigUint) -> Result<Hash256> {
    if difficulty.is_zero() {
        return Err(RifthashError::Invalid("difficulty must be non-zero".into()));
    }
    let boundary = max_target() / difficulty;
    let bytes = boundary.to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(Hash256(out))
}

/// Convert a boundary back to the difficulty it encodes. A zero boundary
/// maps to the maximum difficulty.
pub fn boundary_to_difficulty(boundary: &Hash256) -> BigUint {
    let value = BigUint::from_bytes_be(boundary.as_bytes());
    if value.is_zero() {
        max_target()
    } else {
        max_target() / value
    }
}
