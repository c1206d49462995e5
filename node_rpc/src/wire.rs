//! JSON shapes exchanged with the node.

use serde::{Deserialize, Serialize};

use gsp_types::{Block, BlockHash, RawMove};

use crate::NodeRpcError;

/// Node error code for an unknown block hash.
pub const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
/// Node error code for a height above the best block.
pub const RPC_INVALID_PARAMETER: i64 = -8;

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// The part of `getblockchaininfo` the daemon needs.
#[derive(Debug, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
}

/// A block as returned by `getblock`.
#[derive(Debug, Deserialize)]
pub struct WireBlock {
    pub hash: String,
    pub height: u64,
    /// Absent for the genesis block.
    #[serde(default)]
    pub previousblockhash: Option<String>,
    /// Kept as raw JSON so one malformed entry does not reject the block.
    #[serde(default)]
    pub moves: Vec<serde_json::Value>,
}

impl WireBlock {
    pub fn into_block(self) -> Result<Block, NodeRpcError> {
        let hash = parse_hash(&self.hash)?;
        let parent = match &self.previousblockhash {
            Some(hex) => parse_hash(hex)?,
            None => BlockHash::ZERO,
        };
        let moves = self
            .moves
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value::<RawMove>(entry) {
                Ok(mv) => Some(mv),
                Err(e) => {
                    tracing::warn!(block = %hash, index, "dropping malformed move entry: {e}");
                    None
                }
            })
            .collect();
        Ok(Block {
            hash,
            height: self.height,
            parent,
            moves,
        })
    }
}

pub fn parse_hash(hex: &str) -> Result<BlockHash, NodeRpcError> {
    hex.parse()
        .map_err(|e| NodeRpcError::InvalidResponse(format!("{e}")))
}
