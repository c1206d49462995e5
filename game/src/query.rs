//! The read side of the game state.
//!
//! The block processor publishes a new [`Snapshot`] after every committed
//! step. Readers clone an `Arc` under a lock that is held only for that
//! pointer copy, so they never wait for a block to finish and never see
//! one half-applied.

use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{oneshot, watch};

use gsp_types::{BlockHash, ChainTip};

use crate::GameState;

/// Game state as of one fully processed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub tip: ChainTip,
    pub state: Arc<GameState>,
}

/// Whether the processor has caught up with the node's best block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    CatchingUp,
    UpToDate,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatchingUp => "catching-up",
            Self::UpToDate => "up-to-date",
        }
    }
}

/// Snapshot and sync status, swapped under one lock.
struct Published {
    snapshot: Arc<Snapshot>,
    status: SyncStatus,
}

/// Shared handle to the latest committed snapshot.
pub struct StateView {
    current: RwLock<Published>,
    tip_tx: watch::Sender<BlockHash>,
}

impl StateView {
    pub fn new(initial: Snapshot) -> Self {
        let (tip_tx, _) = watch::channel(initial.tip.hash);
        Self {
            current: RwLock::new(Published {
                snapshot: Arc::new(initial),
                status: SyncStatus::CatchingUp,
            }),
            tip_tx,
        }
    }

    /// The state consistent with the current chain tip.
    pub fn get_state(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard.snapshot)
    }

    /// The current snapshot together with the status recorded alongside it.
    pub fn get_state_with_status(&self) -> (Arc<Snapshot>, SyncStatus) {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        (Arc::clone(&guard.snapshot), guard.status)
    }

    /// Receiver that observes every new tip hash.
    pub fn subscribe(&self) -> watch::Receiver<BlockHash> {
        self.tip_tx.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    pub fn set_status(&self, status: SyncStatus) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .status = status;
    }

    /// Swap in a new snapshot and announce its tip. The block processor
    /// calls this after every committed step.
    pub fn publish(&self, snapshot: Snapshot) {
        let hash = snapshot.tip.hash;
        {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            guard.snapshot = Arc::new(snapshot);
        }
        self.tip_tx.send_replace(hash);
    }
}

/// A request for the state at an earlier block.
///
/// Only the block processor can rebuild past state, so queriers send this
/// to the task that owns it and await the reply.
#[derive(Debug)]
pub struct HistoryQuery {
    pub hash: BlockHash,
    pub reply: oneshot::Sender<Option<Snapshot>>,
}

impl HistoryQuery {
    pub fn new(hash: BlockHash) -> (Self, oneshot::Receiver<Option<Snapshot>>) {
        let (reply, rx) = oneshot::channel();
        (Self { hash, reply }, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(byte: u8, height: u64, state: GameState) -> Snapshot {
        Snapshot {
            tip: ChainTip::new(BlockHash::new([byte; 32]), height),
            state: Arc::new(state),
        }
    }

    #[test]
    fn get_state_is_idempotent() {
        let view = StateView::new(snapshot(1, 1, [("foo", "x")].into_iter().collect()));
        let a = view.get_state();
        let b = view.get_state();
        assert_eq!(a, b);
    }

    #[test]
    fn readers_keep_their_snapshot_across_publish() {
        let view = StateView::new(snapshot(1, 1, GameState::new()));
        let before = view.get_state();
        view.publish(snapshot(2, 2, [("foo", "x")].into_iter().collect()));
        assert!(before.state.is_empty());
        assert_eq!(view.get_state().state.get("foo"), Some("x"));
    }

    #[tokio::test]
    async fn subscribers_see_new_tips() {
        let view = StateView::new(snapshot(1, 1, GameState::new()));
        let mut rx = view.subscribe();
        view.publish(snapshot(2, 2, GameState::new()));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), BlockHash::new([2; 32]));
    }

    #[test]
    fn status_starts_catching_up() {
        let view = StateView::new(snapshot(1, 1, GameState::new()));
        assert_eq!(view.status(), SyncStatus::CatchingUp);
        view.set_status(SyncStatus::UpToDate);
        assert_eq!(view.status().as_str(), "up-to-date");
    }

    #[test]
    fn status_is_read_with_its_snapshot() {
        let view = StateView::new(snapshot(1, 1, GameState::new()));
        view.set_status(SyncStatus::UpToDate);
        view.publish(snapshot(2, 2, GameState::new()));
        view.set_status(SyncStatus::CatchingUp);

        let (snap, status) = view.get_state_with_status();
        assert_eq!(snap.tip.height, 2);
        assert_eq!(status, SyncStatus::CatchingUp);
    }
}
