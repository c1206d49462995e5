//! Abstract storage for the game-state processor.
//!
//! Every storage backend (LMDB, in-memory) implements [`GameStore`]. The
//! block processor depends only on the trait: it stages a whole block in
//! memory, then hands the backend one [`StoreBatch`] that must be applied
//! atomically.

pub mod batch;
pub mod error;
pub mod memory;
pub mod undo;

pub use batch::StoreBatch;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use undo::{BlockUndo, UndoEntry};

use std::collections::BTreeMap;

use gsp_types::ChainTip;

/// Current on-disk layout version.
pub const SCHEMA_VERSION: u32 = 1;

/// Everything a backend remembers about a game, as loaded on start-up.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistedGame {
    /// The block the game started at.
    pub anchor: Option<ChainTip>,
    /// The block whose effects the stored state reflects.
    pub tip: Option<ChainTip>,
    /// Latest message per name.
    pub state: BTreeMap<String, String>,
    /// Retained undo records, oldest first.
    pub undo: Vec<BlockUndo>,
}

impl PersistedGame {
    /// A backend that has never been written to.
    pub fn is_empty(&self) -> bool {
        self.tip.is_none()
    }
}

/// Trait for persisting game state, the chain tip and the undo log.
pub trait GameStore: Send + Sync {
    /// Load everything the backend has stored.
    fn load(&self) -> Result<PersistedGame, StoreError>;

    /// Apply a batch atomically: either every change is durable or none is.
    fn commit(&self, batch: &StoreBatch) -> Result<(), StoreError>;

    /// Short backend name for logs.
    fn kind(&self) -> &'static str;
}
