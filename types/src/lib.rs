//! Fundamental types for the HelloWorld game-state processor.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! block hashes, blocks with their raw move payloads, chain tips, and the chains
//! the game can run on together with their anchor blocks.

pub mod block;
pub mod chain;
pub mod error;

pub use block::{Block, BlockHash, ChainTip, RawMove};
pub use chain::Chain;
pub use error::TypesError;
