//! Daemon configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use gsp_types::{BlockHash, Chain, ChainTip};

use crate::{LogFormat, NodeError};

/// Identifier of the game, used in RPC replies and the data directory.
pub const GAME_ID: &str = "helloworld";

/// Where game state is persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Lmdb,
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "lmdb" => Ok(Self::Lmdb),
            other => Err(format!(
                "unknown storage type {other:?}, expected memory or lmdb"
            )),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Lmdb => "lmdb",
        })
    }
}

/// A block to start the game at instead of the chain's built-in anchor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub hash: String,
    pub height: u64,
}

impl AnchorConfig {
    pub fn to_tip(&self) -> Result<ChainTip, NodeError> {
        let hash: BlockHash = self
            .hash
            .parse()
            .map_err(|e| NodeError::Config(format!("anchor hash: {e}")))?;
        Ok(ChainTip::new(hash, self.height))
    }
}

/// Configuration for the game daemon.
///
/// Can be loaded from a TOML file via [`DaemonConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Command-line flags override
/// whatever the file says.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// JSON-RPC endpoint of the blockchain node, optionally with
    /// `user:password@` credentials.
    #[serde(default)]
    pub node_rpc_url: String,

    /// Port for the game JSON-RPC server; 0 disables it.
    #[serde(default)]
    pub game_rpc_port: u16,

    /// Number of blocks whose undo data is kept; negative keeps all.
    #[serde(default = "default_enable_pruning")]
    pub enable_pruning: i64,

    #[serde(default)]
    pub storage_type: StorageType,

    /// Base data directory; the game id and chain are appended.
    #[serde(default)]
    pub datadir: Option<PathBuf>,

    /// Expected chain. When unset, whatever the node reports is used.
    #[serde(default)]
    pub chain: Option<Chain>,

    /// Overrides the chain's built-in anchor block.
    #[serde(default)]
    pub anchor: Option<AnchorConfig>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deepest reorg the tracker will follow.
    #[serde(default = "default_max_reorg_depth")]
    pub max_reorg_depth: u64,

    /// Blocks connected per reconciliation before yielding.
    #[serde(default = "default_max_blocks_per_sync")]
    pub max_blocks_per_sync: u64,

    /// Upper bound for a `waitforchange` call.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    #[serde(default = "default_lmdb_map_size")]
    pub lmdb_map_size: usize,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_enable_pruning() -> i64 {
    -1
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_reorg_depth() -> u64 {
    1_000
}

fn default_max_blocks_per_sync() -> u64 {
    500
}

fn default_wait_timeout_ms() -> u64 {
    5_000
}

fn default_lmdb_map_size() -> usize {
    gsp_store_lmdb::environment::DEFAULT_MAP_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl DaemonConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Check the combinations the daemon cannot start with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.storage_type != StorageType::Memory && self.datadir.is_none() {
            return Err(NodeError::Config(format!(
                "datadir is required for {} storage",
                self.storage_type
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(NodeError::Config("poll_interval_ms must be positive".into()));
        }
        if self.max_blocks_per_sync == 0 {
            return Err(NodeError::Config("max_blocks_per_sync must be positive".into()));
        }
        if let Some(anchor) = &self.anchor {
            anchor.to_tip()?;
        }
        Ok(())
    }

    /// Undo retention: `None` keeps every record.
    pub fn pruning(&self) -> Option<u64> {
        u64::try_from(self.enable_pruning).ok()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// The anchor for `chain`, honouring any override.
    pub fn anchor_for(&self, chain: Chain) -> Result<ChainTip, NodeError> {
        match &self.anchor {
            Some(anchor) => anchor.to_tip(),
            None => Ok(chain.anchor()),
        }
    }

    /// `<datadir>/helloworld/<chain>`, or `None` without a datadir.
    pub fn game_dir(&self, chain: Chain) -> Option<PathBuf> {
        self.datadir
            .as_ref()
            .map(|base| base.join(GAME_ID).join(chain.as_str()))
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            node_rpc_url: String::new(),
            game_rpc_port: 0,
            enable_pruning: default_enable_pruning(),
            storage_type: StorageType::default(),
            datadir: None,
            chain: None,
            anchor: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_reorg_depth: default_max_reorg_depth(),
            max_blocks_per_sync: default_max_blocks_per_sync(),
            wait_timeout_ms: default_wait_timeout_ms(),
            lmdb_map_size: default_lmdb_map_size(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = DaemonConfig {
            node_rpc_url: "http://u:p@127.0.0.1:18443".into(),
            datadir: Some("/tmp/gsp".into()),
            ..DaemonConfig::default()
        };
        let toml_str = config.to_toml_string().unwrap();
        let parsed = DaemonConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.node_rpc_url, config.node_rpc_url);
        assert_eq!(parsed.poll_interval_ms, config.poll_interval_ms);
        assert_eq!(parsed.datadir, config.datadir);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = DaemonConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.game_rpc_port, 0);
        assert_eq!(config.pruning(), None);
        assert_eq!(config.storage_type, StorageType::Memory);
        assert_eq!(config.log_format, LogFormat::Human);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            node_rpc_url = "http://127.0.0.1:18443"
            enable_pruning = 10
            storage_type = "lmdb"
            datadir = "/var/lib/gsp"
            chain = "regtest"
            log_format = "json"

            [anchor]
            hash = "0101010101010101010101010101010101010101010101010101010101010101"
            height = 3
        "#;
        let config = DaemonConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.pruning(), Some(10));
        assert_eq!(config.storage_type, StorageType::Lmdb);
        assert_eq!(config.chain, Some(Chain::Regtest));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_level, "info"); // default
        assert_eq!(
            config.anchor_for(Chain::Regtest).unwrap(),
            ChainTip::new(BlockHash::new([1; 32]), 3)
        );
        assert_eq!(
            config.game_dir(Chain::Regtest).unwrap(),
            PathBuf::from("/var/lib/gsp/helloworld/regtest")
        );
        config.validate().unwrap();
    }

    #[test]
    fn builtin_anchor_without_override() {
        let config = DaemonConfig::default();
        assert_eq!(config.anchor_for(Chain::Main).unwrap(), Chain::Main.anchor());
    }

    #[test]
    fn validation_failures() {
        DaemonConfig::default().validate().unwrap();

        let lmdb_without_dir = DaemonConfig {
            storage_type: StorageType::Lmdb,
            ..DaemonConfig::default()
        };
        assert!(lmdb_without_dir.validate().is_err());

        let bad_anchor = DaemonConfig {
            anchor: Some(AnchorConfig {
                hash: "zz".into(),
                height: 0,
            }),
            ..DaemonConfig::default()
        };
        assert!(bad_anchor.validate().is_err());

        let no_polling = DaemonConfig {
            poll_interval_ms: 0,
            ..DaemonConfig::default()
        };
        assert!(no_polling.validate().is_err());
    }

    #[test]
    fn storage_type_parses() {
        assert_eq!("LMDB".parse::<StorageType>().unwrap(), StorageType::Lmdb);
        assert!("sqlite".parse::<StorageType>().is_err());
    }

    #[test]
    fn zero_pruning_keeps_nothing() {
        let config = DaemonConfig {
            enable_pruning: 0,
            ..DaemonConfig::default()
        };
        assert_eq!(config.pruning(), Some(0));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = DaemonConfig::from_toml_file("/nonexistent/helloworld.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
