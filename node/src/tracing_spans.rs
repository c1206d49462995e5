//! Pre-built [`tracing::Span`] constructors for common daemon operations.
//!
//! Consistent span names and field sets make it easy to follow one block
//! through the logs.

use tracing::{info_span, Span};

use gsp_types::{BlockHash, ChainTip};

/// Span covering the connection of a single block.
pub fn block_connect_span(hash: &BlockHash, height: u64) -> Span {
    info_span!("block_connect", hash = %hash, height)
}

/// Span covering the disconnection of the tip block.
pub fn block_disconnect_span(tip: &ChainTip) -> Span {
    info_span!("block_disconnect", hash = %tip.hash, height = tip.height)
}

/// Span covering one reconciliation of the local tip with the node's best
/// block.
pub fn reconcile_span(tip: &ChainTip, best: &BlockHash) -> Span {
    info_span!("reconcile", tip = %tip, best = %best)
}
