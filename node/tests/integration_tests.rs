//! Integration tests exercising the full pipeline:
//! simulated node → tracker → block processor → backend → state view.
//!
//! The node is a `NullNode`, so every test controls exactly which blocks
//! exist, which one is best, and which ones the node cannot serve.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use gsp_game::{BlockProcessor, HistoryQuery, SyncStatus};
use gsp_moves::HelloWorldDecoder;
use gsp_node::{
    AnchorConfig, ChainTracker, DaemonConfig, GameDaemon, GspMetrics, NodeError,
    ShutdownController, StorageType, TrackerConfig,
};
use gsp_node_rpc::{NodeRpc, NodeRpcError};
use gsp_nullables::NullNode;
use gsp_store::MemoryStore;
use gsp_types::{Block, BlockHash, Chain};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Rig {
    node: Arc<NullNode>,
    tracker: ChainTracker<Arc<NullNode>>,
    metrics: Arc<GspMetrics>,
    shutdown: Arc<ShutdownController>,
}

fn rig_with(pruning: Option<u64>, config: TrackerConfig) -> Rig {
    let node = Arc::new(NullNode::new());
    let processor = BlockProcessor::open(
        node.genesis(),
        pruning,
        Arc::new(HelloWorldDecoder::new()),
        Arc::new(MemoryStore::new()),
    )
    .expect("open processor");
    let metrics = Arc::new(GspMetrics::new().expect("metrics"));
    let shutdown = Arc::new(ShutdownController::new());
    let tracker = ChainTracker::new(
        Arc::clone(&node),
        processor,
        config,
        Arc::clone(&metrics),
        Arc::clone(&shutdown),
    );
    Rig {
        node,
        tracker,
        metrics,
        shutdown,
    }
}

fn rig() -> Rig {
    rig_with(None, TrackerConfig::default())
}

fn game_state(tracker: &ChainTracker<Arc<NullNode>>) -> serde_json::Value {
    tracker.processor().view().get_state().state.to_json()
}

fn daemon_config(node: &NullNode, dir: &tempfile::TempDir) -> DaemonConfig {
    let genesis = node.genesis();
    DaemonConfig {
        node_rpc_url: "http://unused".into(),
        storage_type: StorageType::Lmdb,
        datadir: Some(dir.path().to_path_buf()),
        anchor: Some(AnchorConfig {
            hash: genesis.hash.to_string(),
            height: genesis.height,
        }),
        poll_interval_ms: 10,
        ..DaemonConfig::default()
    }
}

/// Run `daemon` until its tip reaches `height`, then stop it.
async fn run_until_height(daemon: GameDaemon<Arc<NullNode>>, height: u64) {
    let view = daemon.view();
    let shutdown = daemon.shutdown_handle();
    let mut tips = view.subscribe();
    let task = tokio::spawn(daemon.run());
    tokio::time::timeout(Duration::from_secs(10), async {
        while view.get_state().tip.height != height {
            tips.changed().await.expect("view alive");
        }
    })
    .await
    .expect("daemon reached height");
    shutdown.shutdown();
    task.await.expect("join").expect("daemon ran cleanly");
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hello_world_scenario() {
    let mut rig = rig();
    assert_eq!(game_state(&rig.tracker), json!({}));

    rig.node.generate(1);
    let report = rig.tracker.sync().await.unwrap();
    assert_eq!(report.connected, 1);
    assert_eq!(game_state(&rig.tracker), json!({}));

    rig.node.send_move("bar", json!(42));
    rig.node.send_move("foo", json!("Hello World!"));
    rig.node.generate(1);
    let report = rig.tracker.sync().await.unwrap();
    assert_eq!(report.moves_rejected, 1);
    assert_eq!(report.moves_applied, 1);
    assert_eq!(game_state(&rig.tracker), json!({"foo": "Hello World!"}));

    rig.node.send_move("bar", json!("hi"));
    rig.node.send_move("foo", json!({"m": "bye"}));
    let best = rig.node.generate(1)[0];
    rig.tracker.sync().await.unwrap();
    assert_eq!(game_state(&rig.tracker), json!({"bar": "hi", "foo": "bye"}));

    rig.node.invalidate_block(&best);
    let report = rig.tracker.sync().await.unwrap();
    assert_eq!(report.disconnected, 1);
    assert_eq!(report.connected, 0);
    assert!(report.up_to_date);
    assert_eq!(game_state(&rig.tracker), json!({"foo": "Hello World!"}));
    assert_eq!(rig.metrics.reorgs.get(), 1);
    assert_eq!(rig.metrics.moves_rejected.get(), 1);
}

#[tokio::test]
async fn sync_without_new_blocks_is_a_noop() {
    let mut rig = rig();
    rig.node.generate(2);
    rig.tracker.sync().await.unwrap();
    let before = rig.tracker.processor().view().get_state();

    let report = rig.tracker.sync().await.unwrap();
    assert_eq!((report.connected, report.disconnected), (0, 0));
    assert!(report.up_to_date);
    assert_eq!(rig.tracker.processor().view().get_state(), before);
    assert_eq!(rig.tracker.processor().view().status(), SyncStatus::UpToDate);
}

#[tokio::test]
async fn pure_extension_never_disconnects() {
    let mut rig = rig();
    rig.node.send_move("foo", json!("a"));
    rig.node.generate(3);
    rig.tracker.sync().await.unwrap();

    rig.node.send_move("foo", json!("b"));
    rig.node.generate(2);
    let report = rig.tracker.sync().await.unwrap();
    assert_eq!(report.disconnected, 0);
    assert_eq!(report.connected, 2);
    assert_eq!(rig.metrics.blocks_disconnected.get(), 0);
    assert_eq!(rig.metrics.reorgs.get(), 0);
    assert_eq!(rig.metrics.tip_height.get(), 5);
    assert_eq!(game_state(&rig.tracker), json!({"foo": "b"}));
}

#[tokio::test]
async fn reorg_to_sibling_branch() {
    let mut rig = rig();
    let main = rig.node.generate(1);
    rig.node.send_move("foo", json!("main"));
    rig.node.generate(1);
    rig.tracker.sync().await.unwrap();
    assert_eq!(game_state(&rig.tracker), json!({"foo": "main"}));

    // Longer branch from the first block; the "main" move goes nowhere.
    rig.node.generate_from(&main[0], 2);
    rig.node.send_move("bar", json!("fork"));
    let tip = rig.node.generate(1)[0];

    let report = rig.tracker.sync().await.unwrap();
    assert_eq!(report.disconnected, 1);
    assert_eq!(report.connected, 3);
    assert_eq!(report.tip.hash, tip);
    assert_eq!(game_state(&rig.tracker), json!({"bar": "fork"}));
}

#[tokio::test]
async fn catch_up_is_chunked() {
    let config = TrackerConfig {
        max_blocks_per_sync: 2,
        ..TrackerConfig::default()
    };
    let mut rig = rig_with(None, config);
    rig.node.generate(5);

    let report = rig.tracker.sync().await.unwrap();
    assert_eq!(report.connected, 2);
    assert!(!report.up_to_date);
    assert_eq!(rig.tracker.processor().view().status(), SyncStatus::CatchingUp);

    rig.tracker.sync().await.unwrap();
    let report = rig.tracker.sync().await.unwrap();
    assert_eq!(report.tip.height, 5);
    assert!(report.up_to_date);
    assert_eq!(rig.tracker.processor().view().status(), SyncStatus::UpToDate);
}

#[tokio::test]
async fn unbounded_batch_size_catches_up_in_one_step() {
    let config = TrackerConfig {
        max_blocks_per_sync: u64::MAX,
        ..TrackerConfig::default()
    };
    let mut rig = rig_with(None, config);
    let main = rig.node.generate(2);
    rig.tracker.sync().await.unwrap();

    rig.node.generate(3);
    let report = rig.tracker.sync().await.unwrap();
    assert_eq!(report.connected, 3);
    assert!(report.up_to_date);

    rig.node.generate_from(&main[1], 4);
    let report = rig.tracker.sync().await.unwrap();
    assert_eq!(report.disconnected, 3);
    assert_eq!(report.connected, 4);
    assert_eq!(report.tip.height, 6);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_block_is_fatal() {
    let mut rig = rig();
    let hashes = rig.node.generate(2);
    rig.node.prune_block(&hashes[1]);

    let err = rig.tracker.sync().await.unwrap_err();
    assert!(matches!(err, NodeError::MissingBlock(_)));
    assert!(err.is_fatal());
    assert_eq!(rig.tracker.processor().tip(), rig.node.genesis());
}

#[tokio::test]
async fn reorg_below_undo_window_is_fatal() {
    let mut rig = rig_with(Some(1), TrackerConfig::default());
    let main = rig.node.generate(3);
    rig.tracker.sync().await.unwrap();

    rig.node.generate_from(&main[0], 3);
    let err = rig.tracker.sync().await.unwrap_err();
    assert!(matches!(err, NodeError::ReorgDepthExceeded { .. }));
    assert_eq!(rig.tracker.processor().tip().hash, main[2]);
}

#[tokio::test]
async fn reorg_deeper_than_configured_is_fatal() {
    let config = TrackerConfig {
        max_reorg_depth: 1,
        ..TrackerConfig::default()
    };
    let mut rig = rig_with(None, config);
    let main = rig.node.generate(3);
    rig.tracker.sync().await.unwrap();

    rig.node.generate_from(&main[0], 3);
    assert!(matches!(
        rig.tracker.sync().await,
        Err(NodeError::ReorgDepthExceeded { max_depth: 1, .. })
    ));
}

#[tokio::test]
async fn unreachable_node_is_retried() {
    let mut rig = rig();
    rig.node.generate(1);
    rig.node.set_unreachable(true);
    let err = rig.tracker.sync().await.unwrap_err();
    assert!(!err.is_fatal());

    rig.node.set_unreachable(false);
    assert!(rig.tracker.sync().await.unwrap().up_to_date);
}

#[tokio::test]
async fn shutdown_cancels_between_blocks() {
    let mut rig = rig();
    rig.node.generate(3);
    rig.shutdown.shutdown();

    let report = rig.tracker.sync().await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.connected, 0);
    assert_eq!(rig.tracker.processor().tip(), rig.node.genesis());
}

// ---------------------------------------------------------------------------
// Node changing its chain mid-sync
// ---------------------------------------------------------------------------

type Shift = Box<dyn FnOnce(&NullNode) + Send>;

/// Forwards to a `NullNode`, and once armed rewrites its chain right before
/// answering the n-th `get_block_hash` call.
struct ShiftingNode {
    inner: Arc<NullNode>,
    calls: AtomicUsize,
    trigger_at: AtomicUsize,
    shift: Mutex<Option<Shift>>,
}

impl ShiftingNode {
    fn new(inner: Arc<NullNode>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            trigger_at: AtomicUsize::new(0),
            shift: Mutex::new(None),
        }
    }

    fn arm(&self, nth_call: usize, shift: impl FnOnce(&NullNode) + Send + 'static) {
        *self.shift.lock().unwrap() = Some(Box::new(shift));
        self.calls.store(0, Ordering::SeqCst);
        self.trigger_at.store(nth_call, Ordering::SeqCst);
    }
}

impl NodeRpc for ShiftingNode {
    async fn get_chain(&self) -> Result<Chain, NodeRpcError> {
        self.inner.get_chain().await
    }

    async fn get_best_block_hash(&self) -> Result<BlockHash, NodeRpcError> {
        self.inner.get_best_block_hash().await
    }

    async fn get_block_hash(&self, height: u64) -> Result<BlockHash, NodeRpcError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.trigger_at.load(Ordering::SeqCst) {
            let shift = self.shift.lock().unwrap().take();
            if let Some(shift) = shift {
                shift(&self.inner);
            }
        }
        self.inner.get_block_hash(height).await
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<Block, NodeRpcError> {
        self.inner.get_block(hash).await
    }
}

/// A tracker at height 3 behind a node at height 5, plus the node's blocks.
async fn shifting_rig() -> (Arc<ShiftingNode>, ChainTracker<Arc<ShiftingNode>>, Vec<BlockHash>) {
    let null = Arc::new(NullNode::new());
    let node = Arc::new(ShiftingNode::new(Arc::clone(&null)));
    let processor = BlockProcessor::open(
        null.genesis(),
        None,
        Arc::new(HelloWorldDecoder::new()),
        Arc::new(MemoryStore::new()),
    )
    .expect("open processor");
    let mut tracker = ChainTracker::new(
        Arc::clone(&node),
        processor,
        TrackerConfig::default(),
        Arc::new(GspMetrics::new().expect("metrics")),
        Arc::new(ShutdownController::new()),
    );
    let mut hashes = null.generate(3);
    tracker.sync().await.unwrap();
    hashes.extend(null.generate(2));
    (node, tracker, hashes)
}

async fn assert_retry_converges(
    node: &ShiftingNode,
    tracker: &mut ChainTracker<Arc<ShiftingNode>>,
    expected: &str,
) {
    let before = tracker.processor().tip();
    let err = tracker.sync().await.unwrap_err();
    assert!(
        matches!(&err, NodeError::ChainChanged(msg) if msg.contains(expected)),
        "unexpected error: {err}"
    );
    assert!(!err.is_fatal());
    assert_eq!(tracker.processor().tip(), before);

    let report = tracker.sync().await.unwrap();
    assert!(report.up_to_date);
    assert_eq!(tracker.processor().tip(), node.inner.best());
}

#[tokio::test]
async fn chain_shrinking_during_fork_walk_is_retried() {
    let (node, mut tracker, hashes) = shifting_rig().await;
    let stale = hashes[1];
    node.arm(1, move |null| null.invalidate_block(&stale));

    assert_retry_converges(&node, &mut tracker, "no block at height").await;
    assert_eq!(tracker.processor().tip().height, 1);
}

#[tokio::test]
async fn chain_shrinking_during_branch_fetch_is_retried() {
    let (node, mut tracker, hashes) = shifting_rig().await;
    let stale = hashes[3];
    node.arm(2, move |null| null.invalidate_block(&stale));

    assert_retry_converges(&node, &mut tracker, "shrank").await;
    assert_eq!(tracker.processor().tip().hash, hashes[2]);
}

#[tokio::test]
async fn best_block_replaced_during_branch_fetch_is_retried() {
    let (node, mut tracker, hashes) = shifting_rig().await;
    let (stale, fork) = (hashes[3], hashes[2]);
    node.arm(2, move |null| {
        null.invalidate_block(&stale);
        null.generate_from(&fork, 2);
    });

    assert_retry_converges(&node, &mut tracker, "moved away").await;
    assert_eq!(tracker.processor().tip().height, 5);
    assert_ne!(tracker.processor().tip().hash, hashes[4]);
}

// ---------------------------------------------------------------------------
// Run loop and daemon
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_loop_answers_history_queries() {
    let config = TrackerConfig {
        poll_interval: Duration::from_millis(10),
        ..TrackerConfig::default()
    };
    let Rig {
        node,
        mut tracker,
        shutdown,
        ..
    } = rig_with(None, config);
    node.send_move("foo", json!("one"));
    let first = node.generate(1)[0];
    node.send_move("foo", json!("two"));
    node.generate(1);

    let view = tracker.processor().view();
    let mut tips = view.subscribe();
    let (history_tx, history_rx) = mpsc::channel(4);
    let task = tokio::spawn(async move {
        let result = tracker.run(history_rx).await;
        result.map(|()| tracker)
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while view.get_state().tip.height < 2 {
            tips.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    let (query, reply) = HistoryQuery::new(first);
    history_tx.send(query).await.unwrap();
    let snapshot = reply.await.unwrap().expect("block inside undo window");
    assert_eq!(snapshot.tip.height, 1);
    assert_eq!(snapshot.state.get("foo"), Some("one"));
    assert_eq!(view.get_state().state.get("foo"), Some("two"));

    shutdown.shutdown();
    let tracker = task.await.unwrap().unwrap();
    assert_eq!(tracker.processor().tip().height, 2);
}

#[tokio::test]
async fn daemon_rejects_chain_mismatch() {
    let node = Arc::new(NullNode::new());
    let config = DaemonConfig {
        chain: Some(Chain::Main),
        ..DaemonConfig::default()
    };
    assert!(matches!(
        GameDaemon::new(config, node).await,
        Err(NodeError::Config(_))
    ));
}

#[tokio::test]
async fn daemon_resumes_from_lmdb_after_restart() {
    let dir = tempfile::tempdir().expect("temp dir");
    let node = Arc::new(NullNode::new());
    node.send_move("foo", json!("first"));
    node.generate(1);
    node.send_move("foo", json!("second"));
    let second = node.generate(1)[0];

    let daemon = GameDaemon::new(daemon_config(&node, &dir), Arc::clone(&node))
        .await
        .unwrap();
    assert_eq!(daemon.chain(), Chain::Regtest);
    run_until_height(daemon, 2).await;
    assert!(dir.path().join("helloworld").join("regtest").exists());

    let daemon = GameDaemon::new(daemon_config(&node, &dir), Arc::clone(&node))
        .await
        .unwrap();
    assert_eq!(daemon.tip().hash, second);
    assert_eq!(
        daemon.view().get_state().state.to_json(),
        json!({"foo": "second"})
    );

    // Undo data survived the restart.
    node.invalidate_block(&second);
    run_until_height(daemon, 1).await;

    let daemon = GameDaemon::new(daemon_config(&node, &dir), Arc::clone(&node))
        .await
        .unwrap();
    assert_eq!(
        daemon.view().get_state().state.to_json(),
        json!({"foo": "first"})
    );
}
