use thiserror::Error;

/// Why a move payload was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("move sent by an empty name")]
    EmptyPlayer,

    #[error("sender name is {len} bytes, limit is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("move data for {player} is not a string or object: {found}")]
    WrongType { player: String, found: String },

    #[error("move data for {player} has no message field")]
    MissingMessage { player: String },

    #[error("message data for {player} is not a string: {found}")]
    MessageNotString { player: String, found: String },

    #[error("message from {player} is {len} bytes, limit is {max}")]
    Oversized {
        player: String,
        len: usize,
        max: usize,
    },
}
