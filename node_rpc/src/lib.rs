//! The blockchain node as seen by the game-state processor.
//!
//! The node is an external collaborator: the processor only ever asks it for
//! the best block hash, the hash at a height, and a block with the moves it
//! carries. [`NodeRpc`] is that seam; [`JsonRpcNodeClient`] talks to a real
//! node over JSON-RPC and the nullables crate provides a simulated chain.

pub mod client;
pub mod error;
pub mod wire;

pub use client::JsonRpcNodeClient;
pub use error::NodeRpcError;

use std::future::Future;
use std::sync::Arc;

use gsp_types::{Block, BlockHash, Chain};

/// Read access to the node's view of the chain.
pub trait NodeRpc: Send + Sync {
    /// Which network the node runs.
    fn get_chain(&self) -> impl Future<Output = Result<Chain, NodeRpcError>> + Send;

    /// Hash of the node's current best block.
    fn get_best_block_hash(&self) -> impl Future<Output = Result<BlockHash, NodeRpcError>> + Send;

    /// Hash of the best-chain block at `height`.
    ///
    /// Fails with [`NodeRpcError::BlockNotFound`] above the best height.
    fn get_block_hash(
        &self,
        height: u64,
    ) -> impl Future<Output = Result<BlockHash, NodeRpcError>> + Send;

    /// A block with its moves in order.
    ///
    /// Fails with [`NodeRpcError::BlockNotFound`] if the node cannot supply it
    /// (unknown or pruned).
    fn get_block(
        &self,
        hash: &BlockHash,
    ) -> impl Future<Output = Result<Block, NodeRpcError>> + Send;
}

impl<N: NodeRpc> NodeRpc for Arc<N> {
    fn get_chain(&self) -> impl Future<Output = Result<Chain, NodeRpcError>> + Send {
        (**self).get_chain()
    }

    fn get_best_block_hash(&self) -> impl Future<Output = Result<BlockHash, NodeRpcError>> + Send {
        (**self).get_best_block_hash()
    }

    fn get_block_hash(
        &self,
        height: u64,
    ) -> impl Future<Output = Result<BlockHash, NodeRpcError>> + Send {
        (**self).get_block_hash(height)
    }

    fn get_block(
        &self,
        hash: &BlockHash,
    ) -> impl Future<Output = Result<Block, NodeRpcError>> + Send {
        (**self).get_block(hash)
    }
}
