//! Nullable infrastructure for deterministic testing.
//!
//! The blockchain node is the one external dependency of the game-state
//! processor. [`NullNode`] stands in for it: a simulated chain held in
//! memory that tests drive programmatically (send moves, mine blocks, fork,
//! invalidate) and that answers the same [`gsp_node_rpc::NodeRpc`] calls a
//! real node would.

pub mod chain;

pub use chain::NullNode;
