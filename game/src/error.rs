use thiserror::Error;

use gsp_store::StoreError;
use gsp_types::ChainTip;

#[derive(Debug, Error)]
pub enum GameError {
    /// An internal invariant was violated; processing must halt.
    #[error("apply failure: {0}")]
    ApplyFailure(String),

    #[error("stored game starts at {stored:?}, configured anchor is {configured}")]
    AnchorMismatch {
        stored: Option<ChainTip>,
        configured: ChainTip,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
