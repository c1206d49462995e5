//! LMDB storage backend for the game-state processor.
//!
//! Implements [`gsp_store::GameStore`] using the `heed` LMDB bindings. Game
//! state, undo records and metadata live in three databases of a single
//! environment, so every block step is one LMDB write transaction.

pub mod environment;
pub mod error;
pub mod game;
pub mod integrity;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use game::LmdbGameStore;
