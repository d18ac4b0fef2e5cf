/// Common hash and node types shared across the crate

pub mod hash_types;

// Re-export main types
pub use hash_types::{Hash256, Node, NODE_BYTES, NODE_WORDS};
