//! Block hashes, blocks and chain tips.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// A 32-byte block hash, displayed as 64 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl Default for BlockHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a hash from exactly 64 hex digits at compile time.
    ///
    /// Used for the hard-coded anchor blocks; an invalid literal fails the build.
    pub const fn from_hex_const(hex: &str) -> Self {
        let digits = hex.as_bytes();
        assert!(digits.len() == 64, "block hash literal must be 64 hex digits");
        let mut out = [0u8; 32];
        let mut i = 0;
        while i < 32 {
            out[i] = (nibble(digits[2 * i]) << 4) | nibble(digits[2 * i + 1]);
            i += 1;
        }
        Self(out)
    }
}

const fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in block hash literal"),
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({}\u{2026})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for BlockHash {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHash(format!("{s}: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TypesError::InvalidHash(format!("{s}: expected 32 bytes")))?;
        Ok(Self(arr))
    }
}

/// A move as it appears inside a block, before the game has looked at it.
///
/// The payload is whatever JSON the sender attached; it is untrusted and is
/// only interpreted by a move decoder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawMove {
    /// The name that sent the move.
    pub name: String,
    /// Arbitrary JSON move data; `null` when the node reports none.
    #[serde(rename = "move", default)]
    pub payload: serde_json::Value,
    /// Id of the transaction that carried the move (informational only).
    #[serde(default)]
    pub txid: String,
}

impl RawMove {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            txid: String::new(),
        }
    }
}

/// A block of the underlying chain together with its moves in order.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub hash: BlockHash,
    pub height: u64,
    pub parent: BlockHash,
    pub moves: Vec<RawMove>,
}

impl Block {
    /// The chain position this block occupies once connected.
    pub fn tip(&self) -> ChainTip {
        ChainTip::new(self.hash, self.height)
    }
}

/// The block whose effects are currently reflected in the game state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub hash: BlockHash,
    pub height: u64,
}

impl ChainTip {
    pub const fn new(hash: BlockHash, height: u64) -> Self {
        Self { hash, height }
    }
}

impl fmt::Display for ChainTip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.hash, self.height)
    }
}
