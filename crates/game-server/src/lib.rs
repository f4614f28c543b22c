//! Game Server - transport for the crash round
//!
//! Exposes the round engine to clients:
//! - WebSocket: `sync` on connect, phase-tagged snapshots on every change,
//!   `bet` / `cashout` / `cancel` intents inbound
//! - HTTP: health, current state, outcome history and hub counters

pub mod error;
pub mod http_server;
pub mod sessions;
pub mod ws_server;

pub use error::ServerError;
pub use http_server::HttpServer;
pub use sessions::{HubStats, SessionHub, SessionId};
pub use ws_server::WebSocketServer;

/// Game server configuration
#[derive(Clone, Debug)]
pub struct GameServerConfig {
    /// WebSocket bind address
    pub ws_addr: String,
    /// HTTP status bind address
    pub http_addr: String,
    /// Outbound frames buffered per session
    pub session_queue: usize,
    /// Consecutive dropped frames before a session is evicted
    pub max_missed: u32,
}

impl Default for GameServerConfig {
    fn default() -> Self {
        Self {
            ws_addr: "127.0.0.1:8080".to_string(),
            http_addr: "127.0.0.1:8081".to_string(),
            session_queue: 64,
            max_missed: 32,
        }
    }
}
