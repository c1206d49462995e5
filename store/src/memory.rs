//! In-memory backend: nothing survives a restart.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use gsp_types::ChainTip;

use crate::{BlockUndo, GameStore, PersistedGame, StoreBatch, StoreError};

#[derive(Default)]
struct Inner {
    anchor: Option<ChainTip>,
    tip: Option<ChainTip>,
    state: BTreeMap<String, String>,
    undo: BTreeMap<u64, BlockUndo>,
}

/// A volatile [`GameStore`] holding everything behind one mutex.
///
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    /// Number of undo records currently retained.
    pub fn undo_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.undo.len())
    }
}

impl GameStore for MemoryStore {
    fn load(&self) -> Result<PersistedGame, StoreError> {
        let inner = self.lock()?;
        Ok(PersistedGame {
            anchor: inner.anchor,
            tip: inner.tip,
            state: inner.state.clone(),
            undo: inner.undo.values().cloned().collect(),
        })
    }

    fn commit(&self, batch: &StoreBatch) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if let Some(anchor) = batch.anchor {
            inner.anchor = Some(anchor);
        }
        inner.tip = Some(batch.tip);
        for (player, value) in &batch.state_changes {
            match value {
                Some(message) => {
                    inner.state.insert(player.clone(), message.clone());
                }
                None => {
                    inner.state.remove(player);
                }
            }
        }
        for height in &batch.undo_deletes {
            inner.undo.remove(height);
        }
        if let Some(undo) = &batch.undo_put {
            inner.undo.insert(undo.height, undo.clone());
        }
        tracing::trace!(tip = %batch.tip, "memory store committed batch");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UndoEntry;
    use gsp_types::BlockHash;

    fn tip(byte: u8, height: u64) -> ChainTip {
        ChainTip::new(BlockHash::new([byte; 32]), height)
    }

    #[test]
    fn fresh_store_is_empty() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn commit_applies_every_change() {
        let store = MemoryStore::new();
        store.commit(&StoreBatch::initialise(tip(0, 0))).unwrap();

        let mut batch = StoreBatch::new(tip(1, 1));
        batch
            .state_changes
            .insert("foo".into(), Some("hello".into()));
        batch.undo_put = Some(BlockUndo {
            hash: BlockHash::new([1; 32]),
            height: 1,
            parent: BlockHash::new([0; 32]),
            entries: vec![UndoEntry {
                player: "foo".into(),
                previous: None,
            }],
        });
        store.commit(&batch).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.anchor, Some(tip(0, 0)));
        assert_eq!(loaded.tip, Some(tip(1, 1)));
        assert_eq!(loaded.state.get("foo").map(String::as_str), Some("hello"));
        assert_eq!(loaded.undo.len(), 1);
    }

    #[test]
    fn deletes_remove_state_and_undo() {
        let store = MemoryStore::new();
        let mut batch = StoreBatch::initialise(tip(0, 0));
        batch.state_changes.insert("foo".into(), Some("x".into()));
        store.commit(&batch).unwrap();

        let mut batch = StoreBatch::new(tip(0, 0));
        batch.state_changes.insert("foo".into(), None);
        batch.undo_deletes.push(7);
        store.commit(&batch).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.state.is_empty());
        assert_eq!(store.undo_count().unwrap(), 0);
    }
}
