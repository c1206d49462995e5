//! LMDB implementation of GameStore.

use std::collections::BTreeMap;
use std::path::Path;

use heed::RoTxn;

use gsp_store::{BlockUndo, GameStore, PersistedGame, StoreBatch, StoreError};
use gsp_types::ChainTip;

use crate::environment::{LmdbEnvironment, DEFAULT_MAP_SIZE};
use crate::integrity::check_integrity;
use crate::LmdbError;

const TIP_KEY: &[u8] = b"tip";
const ANCHOR_KEY: &[u8] = b"anchor";

/// Game data persisted in LMDB.
pub struct LmdbGameStore {
    env: LmdbEnvironment,
}

impl LmdbGameStore {
    /// Open (or create) the store and verify what is already there.
    pub fn open(path: &Path) -> Result<Self, LmdbError> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        let store = Self {
            env: LmdbEnvironment::open(path, map_size)?,
        };

        let game = store.read_all()?;
        let report = check_integrity(&game);
        if !report.is_healthy() {
            return Err(LmdbError::Corruption(report.errors.join("; ")));
        }
        tracing::info!(
            path = %path.display(),
            state_entries = report.state_entries,
            undo_records = report.undo_records,
            "opened LMDB game store"
        );
        Ok(store)
    }

    fn read_tip(&self, rtxn: &RoTxn, key: &[u8]) -> Result<Option<ChainTip>, LmdbError> {
        match self.env.meta_db.get(rtxn, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    fn read_all(&self) -> Result<PersistedGame, LmdbError> {
        let rtxn = self.env.env.read_txn()?;
        let anchor = self.read_tip(&rtxn, ANCHOR_KEY)?;
        let tip = self.read_tip(&rtxn, TIP_KEY)?;

        let mut state = BTreeMap::new();
        for entry in self.env.state_db.iter(&rtxn)? {
            let (key, value) = entry?;
            let player = std::str::from_utf8(key)
                .map_err(|e| LmdbError::Serialization(format!("player name: {e}")))?;
            let message = std::str::from_utf8(value)
                .map_err(|e| LmdbError::Serialization(format!("message of {player}: {e}")))?;
            state.insert(player.to_string(), message.to_string());
        }

        // Big-endian keys iterate in ascending height order.
        let mut undo = Vec::new();
        for entry in self.env.undo_db.iter(&rtxn)? {
            let (key, value) = entry?;
            let arr: [u8; 8] = key
                .try_into()
                .map_err(|_| LmdbError::Corruption("undo key is not a height".into()))?;
            let record: BlockUndo = bincode::deserialize(value)?;
            if record.height != u64::from_be_bytes(arr) {
                return Err(LmdbError::Corruption(format!(
                    "undo record for height {} stored under height {}",
                    record.height,
                    u64::from_be_bytes(arr)
                )));
            }
            undo.push(record);
        }

        Ok(PersistedGame {
            anchor,
            tip,
            state,
            undo,
        })
    }

    fn write_batch(&self, batch: &StoreBatch) -> Result<(), LmdbError> {
        let mut wtxn = self.env.env.write_txn()?;

        if let Some(anchor) = &batch.anchor {
            self.env
                .meta_db
                .put(&mut wtxn, ANCHOR_KEY, &bincode::serialize(anchor)?)?;
        }
        self.env
            .meta_db
            .put(&mut wtxn, TIP_KEY, &bincode::serialize(&batch.tip)?)?;

        for (player, value) in &batch.state_changes {
            match value {
                Some(message) => {
                    self.env
                        .state_db
                        .put(&mut wtxn, player.as_bytes(), message.as_bytes())?;
                }
                None => {
                    self.env.state_db.delete(&mut wtxn, player.as_bytes())?;
                }
            }
        }

        for height in &batch.undo_deletes {
            self.env.undo_db.delete(&mut wtxn, &height.to_be_bytes())?;
        }
        if let Some(undo) = &batch.undo_put {
            self.env.undo_db.put(
                &mut wtxn,
                &undo.height.to_be_bytes(),
                &bincode::serialize(undo)?,
            )?;
        }

        // Dropping the transaction on any error above aborts every write.
        wtxn.commit()?;
        Ok(())
    }
}

impl GameStore for LmdbGameStore {
    fn load(&self) -> Result<PersistedGame, StoreError> {
        Ok(self.read_all()?)
    }

    fn commit(&self, batch: &StoreBatch) -> Result<(), StoreError> {
        self.write_batch(batch)?;
        tracing::trace!(tip = %batch.tip, "LMDB batch committed");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "lmdb"
    }
}
