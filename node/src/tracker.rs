//! Chain tracker: keeps the game tip on the node's best chain.
//!
//! Each reconciliation finds the fork point between the local chain and the
//! node's best chain, fetches the whole new branch, and only then touches
//! the game: disconnect down to the fork point, connect the branch in height
//! order. Block steps are atomic in the processor, and shutdown is honoured
//! between them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use gsp_game::{BlockProcessor, ConnectOutcome, HistoryQuery, SyncStatus};
use gsp_node_rpc::NodeRpc;
use gsp_types::{Block, BlockHash, ChainTip};

use crate::tracing_spans::{block_connect_span, block_disconnect_span, reconcile_span};
use crate::{DaemonConfig, GspMetrics, NodeError, ShutdownController};

#[derive(Clone, Copy, Debug)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub max_reorg_depth: u64,
    /// Blocks connected per reconciliation; the rest waits for the next one.
    pub max_blocks_per_sync: u64,
}

impl From<&DaemonConfig> for TrackerConfig {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_reorg_depth: config.max_reorg_depth,
            max_blocks_per_sync: config.max_blocks_per_sync.max(1),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

/// What one reconciliation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub tip: ChainTip,
    pub disconnected: u64,
    pub connected: u64,
    pub moves_applied: u64,
    pub moves_rejected: u64,
    /// Stopped early because shutdown was requested.
    pub cancelled: bool,
    /// The tip equals the node's best block.
    pub up_to_date: bool,
}

impl SyncReport {
    fn at(tip: ChainTip) -> Self {
        Self {
            tip,
            disconnected: 0,
            connected: 0,
            moves_applied: 0,
            moves_rejected: 0,
            cancelled: false,
            up_to_date: false,
        }
    }
}

pub struct ChainTracker<N> {
    node: N,
    processor: BlockProcessor,
    config: TrackerConfig,
    metrics: Arc<GspMetrics>,
    shutdown: Arc<ShutdownController>,
}

impl<N: NodeRpc> ChainTracker<N> {
    pub fn new(
        node: N,
        processor: BlockProcessor,
        config: TrackerConfig,
        metrics: Arc<GspMetrics>,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        metrics.tip_height.set(processor.tip().height as i64);
        Self {
            node,
            processor,
            config,
            metrics,
            shutdown,
        }
    }

    pub fn processor(&self) -> &BlockProcessor {
        &self.processor
    }

    /// Poll the node until shutdown, answering history queries in between.
    ///
    /// Returns the first fatal error; recoverable ones are logged and
    /// retried on the next tick.
    pub async fn run(&mut self, mut history: mpsc::Receiver<HistoryQuery>) -> Result<(), NodeError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(tip = %self.processor.tip(), "chain tracker started");

        while !self.shutdown.is_triggered() {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                Some(query) = history.recv() => self.answer(query),
                _ = ticker.tick() => match self.sync().await {
                    Ok(report) => {
                        if report.cancelled {
                            break;
                        }
                        // More to catch up on: go again without waiting.
                        if !report.up_to_date && report.connected > 0 {
                            ticker.reset_immediately();
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        tracing::error!("chain tracker stopped: {e}");
                        return Err(e);
                    }
                    Err(e) => tracing::warn!("sync attempt failed, will retry: {e}"),
                },
            }
        }

        tracing::info!(tip = %self.processor.tip(), "chain tracker stopped");
        Ok(())
    }

    /// Bring the tip as close to the node's best block as one attempt allows.
    pub async fn sync(&mut self) -> Result<SyncReport, NodeError> {
        let best = self.node.get_best_block_hash().await?;
        let tip = self.processor.tip();
        if best == tip.hash {
            self.set_status(SyncStatus::UpToDate);
            let mut report = SyncReport::at(tip);
            report.up_to_date = true;
            return Ok(report);
        }
        self.set_status(SyncStatus::CatchingUp);

        let span = reconcile_span(&tip, &best);
        let report = self.reconcile(best).instrument(span).await?;
        if report.up_to_date {
            self.set_status(SyncStatus::UpToDate);
        }
        if report.connected > 0 || report.disconnected > 0 {
            tracing::debug!(
                tip = %report.tip,
                connected = report.connected,
                disconnected = report.disconnected,
                "sync step finished"
            );
        }
        Ok(report)
    }

    async fn reconcile(&mut self, best: BlockHash) -> Result<SyncReport, NodeError> {
        let mut report = SyncReport::at(self.processor.tip());

        let best_height = self.fetch_block(&best).await?.height;
        let anchor = self.processor.anchor();
        if best_height < anchor.height {
            tracing::info!(best_height, anchor = %anchor, "node is still below the anchor block");
            return Ok(report);
        }

        let (fork_height, fork_hash) = self.find_fork_point(best_height).await?;
        let target = best_height.min(fork_height.saturating_add(self.config.max_blocks_per_sync));
        let branch = self
            .fetch_branch(fork_height, fork_hash, target, &best, best_height)
            .await?;

        let tip = self.processor.tip();
        if tip.height > fork_height {
            tracing::info!(
                from = %tip,
                fork_height,
                disconnects = tip.height - fork_height,
                connects = branch.len(),
                "chain reorganisation"
            );
            self.metrics.reorgs.inc();
        }

        while self.processor.tip().height > fork_height {
            if self.shutdown.is_triggered() {
                report.cancelled = true;
                report.tip = self.processor.tip();
                return Ok(report);
            }
            self.disconnect_tip()?;
            report.disconnected += 1;
        }

        for block in &branch {
            if self.shutdown.is_triggered() {
                report.cancelled = true;
                break;
            }
            let outcome = self.connect_block(block)?;
            report.connected += 1;
            report.moves_applied += outcome.applied as u64;
            report.moves_rejected += outcome.rejected as u64;
        }

        report.tip = self.processor.tip();
        report.up_to_date = report.tip.hash == best;
        Ok(report)
    }

    /// Highest height where the local chain and the node's best chain
    /// agree, walking down from the lower of the two tips.
    async fn find_fork_point(&self, best_height: u64) -> Result<(u64, BlockHash), NodeError> {
        let tip = self.processor.tip();
        let floor = self
            .processor
            .lowest_known_height()
            .max(self.processor.anchor().height);
        let mut height = tip.height.min(best_height);
        loop {
            if height < floor || tip.height - height > self.config.max_reorg_depth {
                return Err(self.depth_exceeded());
            }
            let local = self
                .processor
                .hash_at(height)
                .ok_or_else(|| self.depth_exceeded())?;
            let remote = match self.node.get_block_hash(height).await {
                Ok(hash) => hash,
                Err(e) if e.is_not_found() => {
                    return Err(NodeError::ChainChanged(format!(
                        "node has no block at height {height} any more"
                    )))
                }
                Err(e) => return Err(e.into()),
            };
            if local == remote {
                return Ok((height, local));
            }
            if height == 0 {
                return Err(self.depth_exceeded());
            }
            height -= 1;
        }
    }

    /// Blocks `fork_height + 1 ..= target`, each checked to link to the one
    /// before.
    async fn fetch_branch(
        &self,
        fork_height: u64,
        fork_hash: BlockHash,
        target: u64,
        best: &BlockHash,
        best_height: u64,
    ) -> Result<Vec<Block>, NodeError> {
        let mut blocks = Vec::with_capacity(target.saturating_sub(fork_height) as usize);
        let mut prev = fork_hash;
        for height in fork_height + 1..=target {
            let hash = match self.node.get_block_hash(height).await {
                Ok(hash) => hash,
                Err(e) if e.is_not_found() => {
                    return Err(NodeError::ChainChanged(format!(
                        "best chain shrank below height {height}"
                    )))
                }
                Err(e) => return Err(e.into()),
            };
            let block = self.fetch_block(&hash).await?;
            if block.height != height || block.parent != prev {
                return Err(NodeError::ChainChanged(format!(
                    "block {hash} at height {height} does not extend {prev}"
                )));
            }
            prev = block.hash;
            blocks.push(block);
        }
        if target == best_height && prev != *best {
            return Err(NodeError::ChainChanged(format!(
                "best block moved away from {best}"
            )));
        }
        Ok(blocks)
    }

    async fn fetch_block(&self, hash: &BlockHash) -> Result<Block, NodeError> {
        match self.node.get_block(hash).await {
            Ok(block) => Ok(block),
            Err(e) if e.is_not_found() => Err(NodeError::MissingBlock(hash.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn connect_block(&mut self, block: &Block) -> Result<ConnectOutcome, NodeError> {
        let span = block_connect_span(&block.hash, block.height);
        let _enter = span.enter();
        let started = Instant::now();
        let outcome = self.processor.connect(block)?;
        self.metrics
            .block_process_time_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        self.metrics.blocks_connected.inc();
        self.metrics.moves_applied.inc_by(outcome.applied as u64);
        self.metrics.moves_rejected.inc_by(outcome.rejected as u64);
        self.metrics.tip_height.set(outcome.tip.height as i64);
        Ok(outcome)
    }

    fn disconnect_tip(&mut self) -> Result<(), NodeError> {
        let tip = self.processor.tip();
        let span = block_disconnect_span(&tip);
        let _enter = span.enter();
        let started = Instant::now();
        let outcome = self.processor.disconnect(&tip.hash)?;
        self.metrics
            .block_process_time_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        self.metrics.blocks_disconnected.inc();
        self.metrics.tip_height.set(outcome.tip.height as i64);
        Ok(())
    }

    fn answer(&self, query: HistoryQuery) {
        let snapshot = match self.processor.state_at(&query.hash) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(hash = %query.hash, "cannot rebuild historical state: {e}");
                None
            }
        };
        let _ = query.reply.send(snapshot);
    }

    fn set_status(&self, status: SyncStatus) {
        self.processor.view().set_status(status);
    }

    fn depth_exceeded(&self) -> NodeError {
        NodeError::ReorgDepthExceeded {
            tip: self.processor.tip(),
            max_depth: self.config.max_reorg_depth,
        }
    }
}
