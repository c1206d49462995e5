//! Nullable node: a simulated blockchain in memory.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use gsp_node_rpc::{NodeRpc, NodeRpcError};
use gsp_types::{Block, BlockHash, Chain, ChainTip, RawMove};

type Blake2b256 = Blake2b<U32>;

fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// A test node that mines blocks on request.
///
/// Behaves like a regtest node: `generate` mines the mempool into a new
/// block on the best chain, `invalidate_block` drops a block and its
/// descendants from consideration and returns their moves to the mempool.
/// The best chain is the highest valid branch; on equal height the branch
/// seen first wins.
pub struct NullNode {
    inner: Mutex<SimChain>,
}

struct SimChain {
    chain: Chain,
    /// Every block ever mined, keyed by hash.
    blocks: HashMap<BlockHash, Block>,
    /// Mining order, used to break height ties.
    seen: HashMap<BlockHash, u64>,
    genesis: BlockHash,
    best: BlockHash,
    invalid: HashSet<BlockHash>,
    /// Blocks the node pretends to have discarded.
    pruned: HashSet<BlockHash>,
    mempool: Vec<RawMove>,
    nonce: u64,
    unreachable: bool,
}

impl NullNode {
    pub fn new() -> Self {
        Self::with_chain(Chain::Regtest)
    }

    /// A node reporting `chain` from `getblockchaininfo`.
    pub fn with_chain(chain: Chain) -> Self {
        let genesis = Block {
            hash: BlockHash::new(blake2b_256_multi(&[
                b"gsp-nullables-genesis",
                chain.as_str().as_bytes(),
            ])),
            height: 0,
            parent: BlockHash::ZERO,
            moves: Vec::new(),
        };
        let hash = genesis.hash;
        let mut sim = SimChain {
            chain,
            blocks: HashMap::new(),
            seen: HashMap::new(),
            genesis: hash,
            best: hash,
            invalid: HashSet::new(),
            pruned: HashSet::new(),
            mempool: Vec::new(),
            nonce: 0,
            unreachable: false,
        };
        sim.insert(genesis);
        Self {
            inner: Mutex::new(sim),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimChain> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The genesis block; a natural anchor for tests.
    pub fn genesis(&self) -> ChainTip {
        let sim = self.lock();
        ChainTip::new(sim.genesis, 0)
    }

    /// The current best block.
    pub fn best(&self) -> ChainTip {
        let sim = self.lock();
        sim.tip_of(&sim.best)
    }

    /// A mined block by hash, whatever its validity.
    pub fn block(&self, hash: &BlockHash) -> Option<Block> {
        self.lock().blocks.get(hash).cloned()
    }

    /// Queue a move for the next mined block. Returns its txid.
    pub fn send_move(&self, name: &str, payload: serde_json::Value) -> String {
        let mut sim = self.lock();
        sim.nonce += 1;
        let txid = hex::encode(blake2b_256_multi(&[
            name.as_bytes(),
            payload.to_string().as_bytes(),
            &sim.nonce.to_le_bytes(),
        ]));
        let mut raw = RawMove::new(name, payload);
        raw.txid = txid.clone();
        sim.mempool.push(raw);
        txid
    }

    /// Number of moves waiting to be mined.
    pub fn mempool_len(&self) -> usize {
        self.lock().mempool.len()
    }

    /// Mine `count` blocks on the best chain. The first one takes the whole
    /// mempool.
    pub fn generate(&self, count: usize) -> Vec<BlockHash> {
        let mut sim = self.lock();
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            let parent = sim.best;
            let moves = std::mem::take(&mut sim.mempool);
            let hash = sim.mine(parent, moves);
            sim.best = hash;
            hashes.push(hash);
        }
        hashes
    }

    /// Mine `count` empty blocks on top of `parent`, which need not be the
    /// best block. The new branch becomes best once it is the highest.
    pub fn generate_from(&self, parent: &BlockHash, count: usize) -> Vec<BlockHash> {
        let mut sim = self.lock();
        let mut hashes = Vec::with_capacity(count);
        let mut parent = *parent;
        if !sim.blocks.contains_key(&parent) {
            return hashes;
        }
        for _ in 0..count {
            parent = sim.mine(parent, Vec::new());
            hashes.push(parent);
        }
        sim.select_best();
        hashes
    }

    /// Mark `hash` and its descendants invalid.
    ///
    /// Moves from disconnected best-chain blocks go back to the mempool in
    /// chain order, ahead of anything already queued.
    pub fn invalidate_block(&self, hash: &BlockHash) {
        let mut sim = self.lock();
        if !sim.blocks.contains_key(hash) || *hash == sim.genesis {
            return;
        }
        let old_best = sim.best;
        let fresh: Vec<BlockHash> = sim
            .blocks
            .keys()
            .copied()
            .filter(|h| sim.descends_from(h, hash))
            .collect();
        sim.invalid.extend(fresh);
        sim.select_best();

        let mut returned = Vec::new();
        let mut cursor = old_best;
        while sim.invalid.contains(&cursor) {
            let Some(block) = sim.blocks.get(&cursor) else {
                break;
            };
            returned.push(block.moves.clone());
            cursor = block.parent;
        }
        let mut mempool: Vec<RawMove> = returned.into_iter().rev().flatten().collect();
        mempool.append(&mut sim.mempool);
        sim.mempool = mempool;
    }

    /// Undo [`invalidate_block`](Self::invalidate_block) for `hash` and its
    /// descendants.
    pub fn reconsider_block(&self, hash: &BlockHash) {
        let mut sim = self.lock();
        let restored: Vec<BlockHash> = sim
            .invalid
            .iter()
            .copied()
            .filter(|h| sim.descends_from(h, hash))
            .collect();
        for h in restored {
            sim.invalid.remove(&h);
        }
        sim.select_best();
    }

    /// Make `getblock` fail for `hash` as if the node had pruned it.
    pub fn prune_block(&self, hash: &BlockHash) {
        self.lock().pruned.insert(*hash);
    }

    /// While set, every RPC call fails as a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }
}

impl Default for NullNode {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChain {
    fn insert(&mut self, block: Block) {
        let order = self.seen.len() as u64;
        self.seen.insert(block.hash, order);
        self.blocks.insert(block.hash, block);
    }

    fn mine(&mut self, parent: BlockHash, moves: Vec<RawMove>) -> BlockHash {
        self.nonce += 1;
        let height = self.blocks.get(&parent).map_or(0, |b| b.height + 1);
        let payload = serde_json::to_vec(&moves).unwrap_or_default();
        let hash = BlockHash::new(blake2b_256_multi(&[
            parent.as_bytes(),
            &height.to_le_bytes(),
            &self.nonce.to_le_bytes(),
            &payload,
        ]));
        self.insert(Block {
            hash,
            height,
            parent,
            moves,
        });
        hash
    }

    fn tip_of(&self, hash: &BlockHash) -> ChainTip {
        let height = self.blocks.get(hash).map_or(0, |b| b.height);
        ChainTip::new(*hash, height)
    }

    /// Whether `hash` is `ancestor` or lies above it.
    fn descends_from(&self, hash: &BlockHash, ancestor: &BlockHash) -> bool {
        let mut cursor = *hash;
        loop {
            if cursor == *ancestor {
                return true;
            }
            match self.blocks.get(&cursor) {
                Some(block) if block.height > 0 => cursor = block.parent,
                _ => return false,
            }
        }
    }

    fn select_best(&mut self) {
        let best = self
            .blocks
            .values()
            .filter(|b| !self.invalid.contains(&b.hash))
            .max_by(|a, b| {
                a.height
                    .cmp(&b.height)
                    .then_with(|| self.seen[&b.hash].cmp(&self.seen[&a.hash]))
            })
            .map(|b| b.hash);
        if let Some(best) = best {
            self.best = best;
        }
    }

    fn check_reachable(&self) -> Result<(), NodeRpcError> {
        if self.unreachable {
            Err(NodeRpcError::Unreachable("null node is offline".into()))
        } else {
            Ok(())
        }
    }
}

impl NodeRpc for NullNode {
    async fn get_chain(&self) -> Result<Chain, NodeRpcError> {
        let sim = self.lock();
        sim.check_reachable()?;
        Ok(sim.chain)
    }

    async fn get_best_block_hash(&self) -> Result<BlockHash, NodeRpcError> {
        let sim = self.lock();
        sim.check_reachable()?;
        Ok(sim.best)
    }

    async fn get_block_hash(&self, height: u64) -> Result<BlockHash, NodeRpcError> {
        let sim = self.lock();
        sim.check_reachable()?;
        let mut cursor = sim.best;
        while let Some(block) = sim.blocks.get(&cursor) {
            if block.height == height {
                return Ok(cursor);
            }
            if block.height < height || block.height == 0 {
                break;
            }
            cursor = block.parent;
        }
        Err(NodeRpcError::BlockNotFound(format!(
            "block height {height} out of range"
        )))
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<Block, NodeRpcError> {
        let sim = self.lock();
        sim.check_reachable()?;
        if sim.pruned.contains(hash) {
            return Err(NodeRpcError::BlockNotFound(format!("block {hash} pruned")));
        }
        sim.blocks
            .get(hash)
            .cloned()
            .ok_or_else(|| NodeRpcError::BlockNotFound(format!("block {hash} not found")))
    }
}
