//! Move decoding for the HelloWorld game.
//!
//! Move data is entered by users and can be any JSON at all. A decoder turns
//! that untrusted payload into a typed [`Move`] exactly once, at the boundary;
//! nothing downstream looks at the raw JSON again.

pub mod error;
pub mod hello;

pub use error::DecodeError;
pub use hello::{HelloWorldDecoder, MAX_MESSAGE_BYTES, MAX_NAME_BYTES};

use serde::{Deserialize, Serialize};

/// A decoded move: the sending name and the message it wants recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub player: String,
    pub message: String,
}

/// Validates and parses raw move payloads for one game.
///
/// Implementations must be pure: the same input always yields the same result.
pub trait MoveDecoder: Send + Sync {
    fn decode(&self, player: &str, raw: &serde_json::Value) -> Result<Move, DecodeError>;
}
