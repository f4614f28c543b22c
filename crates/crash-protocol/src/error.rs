//! Protocol Errors

use thiserror::Error;

/// Errors raised while encoding or decoding wire messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no type tag")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),
}
