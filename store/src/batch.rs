//! A backend-agnostic group of writes that must land together.

use std::collections::BTreeMap;

use gsp_types::ChainTip;

use crate::BlockUndo;

/// One atomic step of the block processor, as seen by a storage backend.
///
/// If a backend fails to apply a batch, none of its writes may be visible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreBatch {
    /// Set only when the game is first initialised.
    pub anchor: Option<ChainTip>,
    /// The new chain tip.
    pub tip: ChainTip,
    /// Final value per touched name; `None` deletes the name.
    pub state_changes: BTreeMap<String, Option<String>>,
    /// Undo record of a newly connected block.
    pub undo_put: Option<BlockUndo>,
    /// Heights whose undo records are consumed or pruned.
    pub undo_deletes: Vec<u64>,
}

impl StoreBatch {
    /// A batch that only moves the tip.
    pub fn new(tip: ChainTip) -> Self {
        Self {
            anchor: None,
            tip,
            state_changes: BTreeMap::new(),
            undo_put: None,
            undo_deletes: Vec::new(),
        }
    }

    /// The very first batch of a fresh game: empty state at the anchor.
    pub fn initialise(anchor: ChainTip) -> Self {
        Self {
            anchor: Some(anchor),
            ..Self::new(anchor)
        }
    }
}
