//! Block processor: the single writer of game state.
//!
//! Moves the chain tip one block at a time. Each step is staged on a private
//! copy of the state, made durable with one backend batch, and only then
//! swapped in and published. A failure anywhere before the swap leaves the
//! processor, the backend and every reader at the previous block.

use std::collections::VecDeque;
use std::sync::Arc;

use gsp_moves::MoveDecoder;
use gsp_store::{BlockUndo, GameStore, StoreBatch};
use gsp_types::{Block, BlockHash, ChainTip};

use crate::{GameError, GameState, Snapshot, StateStore, StateView};

/// What connecting one block did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub tip: ChainTip,
    /// Moves that decoded and were applied.
    pub applied: usize,
    /// Moves that were skipped as invalid.
    pub rejected: usize,
}

/// What disconnecting one block did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisconnectOutcome {
    pub tip: ChainTip,
    /// Undo entries replayed.
    pub reverted: usize,
}

pub struct BlockProcessor {
    /// The block the game starts at; it can never be disconnected.
    anchor: ChainTip,
    tip: ChainTip,
    state: StateStore,
    /// Undo records of the newest connected blocks, oldest first.
    undo_log: VecDeque<BlockUndo>,
    /// Number of undo records to retain; `None` keeps all of them.
    pruning: Option<u64>,
    decoder: Arc<dyn MoveDecoder>,
    backend: Arc<dyn GameStore>,
    view: Arc<StateView>,
}

impl BlockProcessor {
    /// Resume from the backend, or start a fresh game at `anchor`.
    pub fn open(
        anchor: ChainTip,
        pruning: Option<u64>,
        decoder: Arc<dyn MoveDecoder>,
        backend: Arc<dyn GameStore>,
    ) -> Result<Self, GameError> {
        let persisted = backend.load()?;

        let (tip, state, undo_log) = match persisted.tip {
            None => {
                backend.commit(&StoreBatch::initialise(anchor))?;
                tracing::info!(
                    anchor = %anchor,
                    backend = backend.kind(),
                    "initialised game at anchor block"
                );
                (anchor, GameState::new(), VecDeque::new())
            }
            Some(tip) => {
                if persisted.anchor != Some(anchor) {
                    return Err(GameError::AnchorMismatch {
                        stored: persisted.anchor,
                        configured: anchor,
                    });
                }
                tracing::info!(
                    tip = %tip,
                    players = persisted.state.len(),
                    undo_records = persisted.undo.len(),
                    backend = backend.kind(),
                    "resumed game from stored tip"
                );
                (
                    tip,
                    GameState::from(persisted.state),
                    VecDeque::from(persisted.undo),
                )
            }
        };

        let state = StateStore::new(state);
        let view = Arc::new(StateView::new(Snapshot {
            tip,
            state: state.snapshot(),
        }));

        Ok(Self {
            anchor,
            tip,
            state,
            undo_log,
            pruning,
            decoder,
            backend,
            view,
        })
    }

    pub fn anchor(&self) -> ChainTip {
        self.anchor
    }

    pub fn tip(&self) -> ChainTip {
        self.tip
    }

    /// The read handle shared with queriers.
    pub fn view(&self) -> Arc<StateView> {
        Arc::clone(&self.view)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tip: self.tip,
            state: self.state.snapshot(),
        }
    }

    /// Number of blocks that can currently be disconnected.
    pub fn undo_depth(&self) -> usize {
        self.undo_log.len()
    }

    /// Lowest height whose block hash is still known locally.
    pub fn lowest_known_height(&self) -> u64 {
        self.undo_log
            .front()
            .map(|u| u.parent_tip().height)
            .unwrap_or(self.tip.height)
    }

    /// Hash of the local chain at `height`, if still within the undo window.
    pub fn hash_at(&self, height: u64) -> Option<BlockHash> {
        if height == self.tip.height {
            return Some(self.tip.hash);
        }
        if height > self.tip.height {
            return None;
        }
        self.undo_log.iter().rev().find_map(|u| {
            if u.height == height {
                Some(u.hash)
            } else if u.height == height + 1 {
                Some(u.parent)
            } else {
                None
            }
        })
    }

    /// Apply `block` on top of the tip.
    ///
    /// Invalid moves are skipped with a warning; the rest of the block still
    /// applies. The block must extend the current tip.
    pub fn connect(&mut self, block: &Block) -> Result<ConnectOutcome, GameError> {
        if block.parent != self.tip.hash || block.height != self.tip.height + 1 {
            return Err(GameError::ApplyFailure(format!(
                "block {} at height {} does not extend tip {}",
                block.hash, block.height, self.tip
            )));
        }

        let mut staged = self.state.clone();
        let mut entries = Vec::with_capacity(block.moves.len());
        let mut rejected = 0;
        for raw in &block.moves {
            match self.decoder.decode(&raw.name, &raw.payload) {
                Ok(mv) => {
                    tracing::info!("{} said {:?}", mv.player, mv.message);
                    entries.push(staged.apply(&mv));
                }
                Err(e) => {
                    tracing::warn!(player = %raw.name, txid = %raw.txid, "skipping invalid move: {e}");
                    rejected += 1;
                }
            }
        }

        let undo = BlockUndo {
            hash: block.hash,
            height: block.height,
            parent: block.parent,
            entries,
        };
        let applied = undo.entries.len();
        let (pruned, retain_new) = self.prune_plan();

        let mut batch = StoreBatch::new(block.tip());
        batch.state_changes = staged.values_of(&undo.entries);
        batch.undo_deletes = pruned.iter().map(|u| u.height).collect();
        if retain_new {
            batch.undo_put = Some(undo.clone());
        }
        self.backend.commit(&batch)?;

        // Committed: nothing below can fail.
        self.state = staged;
        self.undo_log.drain(..pruned.len());
        if retain_new {
            self.undo_log.push_back(undo);
        }
        self.tip = block.tip();
        self.view.publish(self.snapshot());

        tracing::debug!(tip = %self.tip, applied, rejected, "connected block");
        Ok(ConnectOutcome {
            tip: self.tip,
            applied,
            rejected,
        })
    }

    /// Undo the tip block, moving the tip to its parent.
    pub fn disconnect(&mut self, hash: &BlockHash) -> Result<DisconnectOutcome, GameError> {
        if *hash != self.tip.hash {
            return Err(GameError::ApplyFailure(format!(
                "cannot disconnect {hash}: tip is {}",
                self.tip
            )));
        }
        if self.tip == self.anchor {
            return Err(GameError::ApplyFailure(format!(
                "cannot disconnect the anchor block {}",
                self.anchor
            )));
        }
        let undo = match self.undo_log.back() {
            Some(undo) if undo.hash == *hash => undo,
            _ => {
                return Err(GameError::ApplyFailure(format!(
                    "no undo data for block {hash}"
                )))
            }
        };

        let mut staged = self.state.clone();
        for entry in undo.entries.iter().rev() {
            staged.undo(entry)?;
        }
        let parent = undo.parent_tip();
        let reverted = undo.entries.len();

        let mut batch = StoreBatch::new(parent);
        batch.state_changes = staged.values_of(&undo.entries);
        batch.undo_deletes.push(undo.height);
        self.backend.commit(&batch)?;

        self.state = staged;
        self.undo_log.pop_back();
        self.tip = parent;
        self.view.publish(self.snapshot());

        tracing::debug!(tip = %self.tip, reverted, "disconnected block");
        Ok(DisconnectOutcome {
            tip: self.tip,
            reverted,
        })
    }

    /// State as of an earlier block inside the undo window.
    ///
    /// Rebuilt on a private copy by replaying undo records backwards; the
    /// live state is untouched.
    pub fn state_at(&self, hash: &BlockHash) -> Result<Option<Snapshot>, GameError> {
        if *hash == self.tip.hash {
            return Ok(Some(self.snapshot()));
        }
        let mut scratch = self.state.clone();
        for undo in self.undo_log.iter().rev() {
            for entry in undo.entries.iter().rev() {
                scratch.undo(entry)?;
            }
            if undo.parent == *hash {
                return Ok(Some(Snapshot {
                    tip: undo.parent_tip(),
                    state: scratch.snapshot(),
                }));
            }
        }
        Ok(None)
    }

    /// Which retained records to drop when one more block is connected, and
    /// whether the new block's record is kept at all.
    fn prune_plan(&self) -> (Vec<BlockUndo>, bool) {
        match self.pruning {
            None => (Vec::new(), true),
            Some(0) => (self.undo_log.iter().cloned().collect(), false),
            Some(keep) => {
                let excess = (self.undo_log.len() as u64 + 1).saturating_sub(keep) as usize;
                (self.undo_log.iter().take(excess).cloned().collect(), true)
            }
        }
    }
}
