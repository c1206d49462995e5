//! LMDB environment setup.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use gsp_store::SCHEMA_VERSION;

use crate::integrity::check_data_dir;
use crate::LmdbError;

/// Default map size: 1 GiB is far more than a message board will ever need.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

pub(crate) const STATE_DB: &str = "state";
pub(crate) const UNDO_DB: &str = "undo";
pub(crate) const META_DB: &str = "meta";

pub(crate) const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    pub(crate) env: Env,
    /// Name → latest message.
    pub(crate) state_db: Database<Bytes, Bytes>,
    /// Big-endian height → bincode `BlockUndo`.
    pub(crate) undo_db: Database<Bytes, Bytes>,
    /// Tip, anchor and schema version.
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given directory.
    ///
    /// A fresh environment is stamped with the current schema version; an
    /// existing one must already carry it.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        check_data_dir(path).map_err(LmdbError::Corruption)?;
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per process for this path and
        // never memory-mapped by anything else while the daemon runs.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(3)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let state_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(STATE_DB))?;
        let undo_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(UNDO_DB))?;
        let meta_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(META_DB))?;

        match meta_db.get(&wtxn, SCHEMA_VERSION_KEY)? {
            None => {
                meta_db.put(&mut wtxn, SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_le_bytes())?;
                tracing::info!(version = SCHEMA_VERSION, path = %path.display(), "created game database");
            }
            Some(bytes) => {
                let arr: [u8; 4] = bytes.try_into().map_err(|_| {
                    LmdbError::Corruption("schema_version has unexpected byte length".into())
                })?;
                let found = u32::from_le_bytes(arr);
                if found != SCHEMA_VERSION {
                    return Err(LmdbError::SchemaVersion {
                        found,
                        expected: SCHEMA_VERSION,
                    });
                }
            }
        }
        wtxn.commit()?;

        Ok(Self {
            env,
            state_db,
            undo_db,
            meta_db,
        })
    }
}
