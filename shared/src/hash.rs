use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash de 256 bits usado para identificar blocos, transações e outros dados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// Creates a zeroed hash
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Creates a hash from a 32-byte array
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the hash
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes SHA256(SHA256(data)), the double hash used for block and
    /// transaction ids. Double hashing defeats length-extension attacks.
    #[must_use]
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&second);
        Self(hash)
    }

    /// Hex-encodes the hash, lowercase, no prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a lowercase hex string into a hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not 32 bytes long.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let mut hash = [0u8; 32];
        if bytes.len() != 32 {
            // hex::FromHexError has no "wrong length" variant for arbitrary
            // byte buffers, so fold this into an OddLength-style error by
            // re-deriving it from a deliberately mis-sized decode.
            return Err(hex::FromHexError::InvalidStringLength);
        }
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }

    /// Checks whether the hex encoding of this hash begins with `difficulty`
    /// leading zero hexadecimal characters (nibbles, not bits).
    #[must_use]
    pub fn meets_difficulty(&self, difficulty: u8) -> bool {
        self.leading_hex_zeros() >= u32::from(difficulty)
    }

    /// Counts the number of leading zero hex nibbles in this hash.
    #[must_use]
    pub fn leading_hex_zeros(&self) -> u32 {
        let mut zeros = 0u32;
        for &byte in &self.0 {
            let high = byte >> 4;
            let low = byte & 0x0f;
            if high == 0 {
                zeros += 1;
            } else {
                break;
            }
            if low == 0 {
                zeros += 1;
            } else {
                break;
            }
        }
        zeros
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<&str> for Hash256 {
    type Error = hex::FromHexError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_hex(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_displays_all_zeros() {
        let hash = Hash256::zero();
        assert_eq!(hash.to_string(), "0".repeat(64));
    }

    #[test]
    fn double_sha256_is_deterministic_and_nonzero() {
        let data = b"hello world";
        let a = Hash256::double_sha256(data);
        let b = Hash256::double_sha256(data);
        assert_eq!(a, b);
        assert_ne!(a, Hash256::zero());
    }

    #[test]
    fn hex_round_trips() {
        let hash = Hash256::double_sha256(b"round trip");
        let hex = hash.to_hex();
        let back = Hash256::from_hex(&hex).unwrap();
        assert_eq!(hash, back);
    }

    #[test]
    fn difficulty_counts_hex_nibbles_not_bits() {
        // 0x00 0x0a.. -> "000a..." has 3 leading zero nibbles, not bits.
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0x00;
        bytes[1] = 0x0a;
        let hash = Hash256::from_bytes(bytes);
        assert_eq!(hash.leading_hex_zeros(), 3);
        assert!(hash.meets_difficulty(3));
        assert!(!hash.meets_difficulty(4));
    }
}
