//! Hashing, one-time signatures, and wire checksums.

pub mod crc16;
pub mod wots;

use sha2::{Digest, Sha256};

/// SHA-256 of arbitrary bytes, returned as a 32-byte array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub use crc16::crc16;
