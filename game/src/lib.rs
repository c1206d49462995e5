//! The game-state core.
//!
//! - [`StateStore`] holds the latest message per name and can apply a move
//!   or undo one exactly.
//! - [`BlockProcessor`] owns the state, the chain tip and the undo log. It
//!   connects a block on top of the tip or disconnects the tip block, one
//!   block at a time and all-or-nothing.
//! - [`StateView`] is the read side: committed snapshots that queriers can
//!   grab at any time without ever seeing half a block.

pub mod error;
pub mod processor;
pub mod query;
pub mod state;

pub use error::GameError;
pub use processor::{BlockProcessor, ConnectOutcome, DisconnectOutcome};
pub use query::{HistoryQuery, Snapshot, StateView, SyncStatus};
pub use state::{GameState, StateStore};
