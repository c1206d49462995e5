//! The game daemon: wires backend, processor, tracker and RPC server
//! together and runs them until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use gsp_game::{BlockProcessor, HistoryQuery, StateView};
use gsp_moves::HelloWorldDecoder;
use gsp_node_rpc::NodeRpc;
use gsp_rpc::{RpcContext, RpcServer};
use gsp_store::{GameStore, MemoryStore, StoreError};
use gsp_store_lmdb::LmdbGameStore;
use gsp_types::{Chain, ChainTip};

use crate::config::{StorageType, GAME_ID};
use crate::tracker::{ChainTracker, TrackerConfig};
use crate::{DaemonConfig, GspMetrics, NodeError, ShutdownController};

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Pending `getstateat` requests allowed before callers wait.
const HISTORY_QUEUE: usize = 64;

pub struct GameDaemon<N> {
    config: DaemonConfig,
    chain: Chain,
    view: Arc<StateView>,
    metrics: Arc<GspMetrics>,
    shutdown: Arc<ShutdownController>,
    tracker: ChainTracker<N>,
}

impl<N: NodeRpc + 'static> GameDaemon<N> {
    /// Ask the node which chain it runs, open the backend for that chain
    /// and resume (or start) the game.
    pub async fn new(config: DaemonConfig, node: N) -> Result<Self, NodeError> {
        config.validate()?;

        let chain = node.get_chain().await?;
        if let Some(expected) = config.chain {
            if expected != chain {
                return Err(NodeError::Config(format!(
                    "configured for {expected} but the node runs {chain}"
                )));
            }
        }
        let anchor = config.anchor_for(chain)?;
        let backend = open_backend(&config, chain)?;
        tracing::info!(
            game = GAME_ID,
            %chain,
            anchor = %anchor,
            storage = %config.storage_type,
            "starting game daemon"
        );

        let processor = BlockProcessor::open(
            anchor,
            config.pruning(),
            Arc::new(HelloWorldDecoder::new()),
            backend,
        )?;
        let view = processor.view();
        let metrics = Arc::new(GspMetrics::new()?);
        let shutdown = Arc::new(ShutdownController::new());
        let tracker = ChainTracker::new(
            node,
            processor,
            TrackerConfig::from(&config),
            Arc::clone(&metrics),
            Arc::clone(&shutdown),
        );

        Ok(Self {
            config,
            chain,
            view,
            metrics,
            shutdown,
            tracker,
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn tip(&self) -> ChainTip {
        self.tracker.processor().tip()
    }

    pub fn view(&self) -> Arc<StateView> {
        Arc::clone(&self.view)
    }

    pub fn metrics(&self) -> Arc<GspMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn shutdown_handle(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Context for the game RPC server; `history` reaches the tracker task.
    pub fn rpc_context(&self, history: mpsc::Sender<HistoryQuery>) -> Arc<RpcContext> {
        let shutdown = Arc::clone(&self.shutdown);
        Arc::new(RpcContext {
            game_id: GAME_ID.to_string(),
            chain: self.chain,
            view: Arc::clone(&self.view),
            history,
            registry: self.metrics.registry.clone(),
            stop: Arc::new(move || shutdown.shutdown()),
            wait_timeout: self.config.wait_timeout(),
        })
    }

    /// Run until a signal, the `stop` RPC, or a fatal tracker error.
    pub async fn run(self) -> Result<(), NodeError> {
        let (history_tx, history_rx) = mpsc::channel(HISTORY_QUEUE);

        let rpc_task = if self.config.game_rpc_port != 0 {
            let server = RpcServer::new(self.config.game_rpc_port, self.rpc_context(history_tx));
            let listener = server
                .bind()
                .await
                .map_err(|e| NodeError::Server(e.to_string()))?;
            let shutdown_rx = self.shutdown.subscribe();
            Some(tokio::spawn(async move {
                if let Err(e) = server.serve(listener, shutdown_rx).await {
                    tracing::error!("game RPC server failed: {e}");
                }
            }))
        } else {
            drop(history_tx);
            None
        };

        let signals = {
            let shutdown = Arc::clone(&self.shutdown);
            tokio::spawn(async move { shutdown.wait_for_signal().await })
        };

        let mut tracker = self.tracker;
        let result = tracker.run(history_rx).await;

        self.shutdown.shutdown();
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, signals).await;
        if let Some(task) = rpc_task {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!(
                    "shutdown timeout ({:?}), RPC server may still be running",
                    SHUTDOWN_TIMEOUT
                );
            }
        }
        tracing::info!(tip = %tracker.processor().tip(), "game daemon stopped");
        result
    }
}

fn open_backend(config: &DaemonConfig, chain: Chain) -> Result<Arc<dyn GameStore>, NodeError> {
    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageType::Lmdb => {
            let dir = config
                .game_dir(chain)
                .ok_or_else(|| NodeError::Config("datadir is required for lmdb storage".into()))?;
            let store = LmdbGameStore::open_with_map_size(&dir, config.lmdb_map_size)
                .map_err(StoreError::from)?;
            Ok(Arc::new(store))
        }
    }
}
