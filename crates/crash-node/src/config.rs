//! Node Configuration
//!
//! One JSON file covers both subcommands. Missing fields take their defaults,
//! and command line flags override whatever the file sets.

use anyhow::{Context, Result};
use game_server::GameServerConfig;
use round_engine::{RoundConfig, BETTING_WINDOW_MS, COOLDOWN_MS, MAX_CRASH_POINT, TICK_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use sync_client::{BackoffConfig, SyncClientConfig};

/// Node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// WebSocket bind address
    pub ws_addr: String,
    /// HTTP status bind address
    pub http_addr: String,
    /// Betting window in milliseconds
    pub betting_ms: u64,
    /// Multiplier tick interval in milliseconds
    pub tick_ms: u64,
    /// Pause after a crash in milliseconds
    pub cooldown_ms: u64,
    /// Exclusive upper bound for crash points
    pub max_crash_point: f64,
    /// Seed for reproducible crash points
    pub seed: Option<u64>,
    /// Outbound frames buffered per session
    pub session_queue: usize,
    /// Dropped frames tolerated before a session is evicted
    pub max_missed: u32,
    /// Server URL for `watch`
    pub url: String,
    /// Optimistic grace window in milliseconds
    pub grace_ms: u64,
    /// First reconnect delay in milliseconds
    pub reconnect_initial_ms: u64,
    /// Reconnect delay cap in milliseconds
    pub reconnect_max_ms: u64,
    /// Reconnect attempts before waiting for an online signal
    pub reconnect_attempts: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let server = GameServerConfig::default();
        Self {
            url: format!("ws://{}", server.ws_addr),
            ws_addr: server.ws_addr,
            http_addr: server.http_addr,
            betting_ms: BETTING_WINDOW_MS,
            tick_ms: TICK_INTERVAL_MS,
            cooldown_ms: COOLDOWN_MS,
            max_crash_point: MAX_CRASH_POINT,
            seed: None,
            session_queue: server.session_queue,
            max_missed: server.max_missed,
            grace_ms: 500,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 30_000,
            reconnect_attempts: 10,
        }
    }
}

impl NodeConfig {
    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn round_config(&self) -> RoundConfig {
        RoundConfig {
            betting_window: Duration::from_millis(self.betting_ms),
            tick_interval: Duration::from_millis(self.tick_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
            max_crash_point: self.max_crash_point,
            ..Default::default()
        }
    }

    pub fn server_config(&self) -> GameServerConfig {
        GameServerConfig {
            ws_addr: self.ws_addr.clone(),
            http_addr: self.http_addr.clone(),
            session_queue: self.session_queue,
            max_missed: self.max_missed,
        }
    }

    pub fn client_config(&self, user_id: &str) -> SyncClientConfig {
        SyncClientConfig {
            url: self.url.clone(),
            user_id: user_id.to_string(),
            grace: Duration::from_millis(self.grace_ms),
            backoff: BackoffConfig {
                initial: Duration::from_millis(self.reconnect_initial_ms),
                max: Duration::from_millis(self.reconnect_max_ms),
                max_attempts: self.reconnect_attempts,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
