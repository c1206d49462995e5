//! JSON-RPC server for the game-state processor.
//!
//! Provides:
//! - `getcurrentstate`: the state at the current tip plus sync status
//! - `getstateat`: the state at a block still inside the undo window
//! - `waitforchange`: long-poll for a new tip
//! - `stop`: ask the daemon to shut down
//! - `GET /metrics`: Prometheus text exposition

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use server::{router, RpcContext, RpcServer};
