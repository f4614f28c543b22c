//! Client errors

use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("connection attempt timed out")]
    ConnectTimeout,

    #[error("gave up reconnecting after {0} attempts")]
    ReconnectExhausted(u32),

    #[error("sync client stopped")]
    Stopped,
}
