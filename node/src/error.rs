use thiserror::Error;

use gsp_types::ChainTip;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("game error: {0}")]
    Game(#[from] gsp_game::GameError),

    #[error("store error: {0}")]
    Store(#[from] gsp_store::StoreError),

    #[error("node RPC error: {0}")]
    Rpc(#[from] gsp_node_rpc::NodeRpcError),

    #[error("node cannot supply block {0}; resync required")]
    MissingBlock(String),

    #[error("reorg from {tip} needs more than {max_depth} disconnects or goes below the undo window")]
    ReorgDepthExceeded { tip: ChainTip, max_depth: u64 },

    #[error("node changed its chain during sync: {0}")]
    ChainChanged(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("RPC server error: {0}")]
    Server(String),
}

impl NodeError {
    /// Whether the tracker must stop. Recoverable errors are retried on the
    /// next poll.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Rpc(_) | Self::ChainChanged(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsp_node_rpc::NodeRpcError;

    #[test]
    fn fatal_classification() {
        assert!(!NodeError::ChainChanged("x".into()).is_fatal());
        assert!(!NodeError::Rpc(NodeRpcError::Unreachable("x".into())).is_fatal());
        assert!(NodeError::MissingBlock("x".into()).is_fatal());
        assert!(NodeError::Game(gsp_game::GameError::ApplyFailure("x".into())).is_fatal());
    }
}
