//! The HelloWorld move grammar.
//!
//! A move is either a bare JSON string, or an object whose `"m"` field is a
//! string. Any other fields of the object are ignored.

use serde_json::Value;

use crate::{DecodeError, Move, MoveDecoder};

/// Longest message, in UTF-8 bytes, that a name may record.
pub const MAX_MESSAGE_BYTES: usize = 1024;

/// Longest accepted player name, in UTF-8 bytes. Names are storage keys.
pub const MAX_NAME_BYTES: usize = 255;

const MESSAGE_FIELD: &str = "m";

/// Decoder for HelloWorld moves.
#[derive(Clone, Debug)]
pub struct HelloWorldDecoder {
    max_message_bytes: usize,
}

impl HelloWorldDecoder {
    pub fn new() -> Self {
        Self {
            max_message_bytes: MAX_MESSAGE_BYTES,
        }
    }

    /// Use a different message size limit.
    pub fn with_max_message_bytes(max_message_bytes: usize) -> Self {
        Self { max_message_bytes }
    }

    fn check_size(&self, player: &str, message: &str) -> Result<(), DecodeError> {
        if message.len() > self.max_message_bytes {
            return Err(DecodeError::Oversized {
                player: player.to_string(),
                len: message.len(),
                max: self.max_message_bytes,
            });
        }
        Ok(())
    }
}

impl Default for HelloWorldDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveDecoder for HelloWorldDecoder {
    fn decode(&self, player: &str, raw: &Value) -> Result<Move, DecodeError> {
        if player.is_empty() {
            return Err(DecodeError::EmptyPlayer);
        }
        if player.len() > MAX_NAME_BYTES {
            return Err(DecodeError::NameTooLong {
                len: player.len(),
                max: MAX_NAME_BYTES,
            });
        }

        let message = match raw {
            Value::String(s) => s,
            Value::Object(fields) => match fields.get(MESSAGE_FIELD) {
                Some(Value::String(s)) => s,
                Some(other) => {
                    return Err(DecodeError::MessageNotString {
                        player: player.to_string(),
                        found: other.to_string(),
                    })
                }
                None => {
                    return Err(DecodeError::MissingMessage {
                        player: player.to_string(),
                    })
                }
            },
            other => {
                return Err(DecodeError::WrongType {
                    player: player.to_string(),
                    found: other.to_string(),
                })
            }
        };

        self.check_size(player, message)?;

        Ok(Move {
            player: player.to_string(),
            message: message.clone(),
        })
    }
}
