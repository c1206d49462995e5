use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),

    #[error("unsupported schema version {found}, expected {expected}")]
    SchemaVersion { found: u32, expected: u32 },
}

impl From<bincode::Error> for LmdbError {
    fn from(e: bincode::Error) -> Self {
        LmdbError::Serialization(e.to_string())
    }
}

impl From<LmdbError> for gsp_store::StoreError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::Serialization(msg) => gsp_store::StoreError::Serialization(msg),
            LmdbError::Corruption(msg) => gsp_store::StoreError::Corruption(msg),
            LmdbError::SchemaVersion { found, expected } => {
                gsp_store::StoreError::SchemaVersion { found, expected }
            }
            other => gsp_store::StoreError::Backend(other.to_string()),
        }
    }
}
