//! Undo records: what a connected block changed, so it can be reversed.

use serde::{Deserialize, Serialize};

use gsp_types::{BlockHash, ChainTip};

/// The value a single name had before a move overwrote it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub player: String,
    /// `None` if the name had no message yet.
    pub previous: Option<String>,
}

/// All undo entries of one connected block, in the order the moves were applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUndo {
    pub hash: BlockHash,
    pub height: u64,
    pub parent: BlockHash,
    pub entries: Vec<UndoEntry>,
}

impl BlockUndo {
    /// The tip this block produced when it was connected.
    pub fn tip(&self) -> ChainTip {
        ChainTip::new(self.hash, self.height)
    }

    /// The tip that is restored by disconnecting this block.
    pub fn parent_tip(&self) -> ChainTip {
        ChainTip::new(self.parent, self.height.saturating_sub(1))
    }
}
