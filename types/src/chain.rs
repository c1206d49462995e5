//! The chains a game daemon can follow and where the game starts on each.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{BlockHash, ChainTip, TypesError};

const MAIN_ANCHOR: ChainTip = ChainTip::new(
    BlockHash::from_hex_const("8dfc61ce31adcc1b3e4a02148e9ef8dfdd09dfac3b0b7aebfea30a3c8be6819d"),
    555_555,
);

const TEST_ANCHOR: ChainTip = ChainTip::new(
    BlockHash::from_hex_const("e1412241c4c2beaf59de5853d5fc3709c2e31bf2835b8322ce7143cf178df55f"),
    1_800,
);

const REGTEST_ANCHOR: ChainTip = ChainTip::new(
    BlockHash::from_hex_const("fa630c42f5e250d75191914d8d894e3f1e8fd54f750430e279becf86c42abd12"),
    0,
);

/// Identifies which network the node is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// The production network.
    Main,
    /// The public test network.
    Test,
    /// Local regression-test network.
    Regtest,
}

impl Chain {
    /// Human-readable name, as reported by the node's `getblockchaininfo`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
            Self::Regtest => "regtest",
        }
    }

    /// The block at which the game starts; everything before it is ignored
    /// and the game state at this block is empty.
    pub fn anchor(&self) -> ChainTip {
        match self {
            Self::Main => MAIN_ANCHOR,
            Self::Test => TEST_ANCHOR,
            Self::Regtest => REGTEST_ANCHOR,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "main" => Ok(Self::Main),
            "test" => Ok(Self::Test),
            "regtest" => Ok(Self::Regtest),
            _ => Err(TypesError::UnknownChain(s.to_string())),
        }
    }
}
