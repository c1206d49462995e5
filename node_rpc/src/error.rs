use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeRpcError {
    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("node unreachable: {0}")]
    Unreachable(String),

    #[error("request to node failed: {0}")]
    RequestFailed(String),

    #[error("node returned RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response from node: {0}")]
    InvalidResponse(String),
}

impl NodeRpcError {
    /// Whether the node said it does not have the requested block.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BlockNotFound(_))
    }
}
