//! The HelloWorld game daemon.
//!
//! Follows the node's best chain and keeps the game state on it:
//! - [`ChainTracker`] polls the node, finds the fork point on a reorg and
//!   drives the block processor through disconnects and connects
//! - [`GameDaemon`] wires storage, processor, tracker and the game RPC
//!   server together and handles shutdown
//! - configuration, logging, metrics and tracing spans shared by all of it

pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod tracing_spans;
pub mod tracker;

pub use config::{AnchorConfig, DaemonConfig, StorageType, GAME_ID};
pub use daemon::GameDaemon;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::GspMetrics;
pub use shutdown::ShutdownController;
pub use tracker::{ChainTracker, SyncReport, TrackerConfig};
