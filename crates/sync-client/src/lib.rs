//! Sync Client - keeps a local view of the crash round
//!
//! - Single logical WebSocket connection with capped exponential backoff
//! - Online/offline signals from the host
//! - Optimistic bets and cashouts reconciled against server snapshots
//! - Personal bet history and a bounded ledger of recent stakes

pub mod agent;
pub mod backoff;
pub mod client;
pub mod error;
pub mod ledger;
pub mod reconcile;

pub use agent::{GameView, SyncAgent};
pub use backoff::{Backoff, BackoffConfig, ReconnectDecision, ReconnectPolicy};
pub use client::SyncClient;
pub use error::ClientError;
pub use ledger::{BetStatus, LedgerEntry, PersonalBet, PersonalHistory, StakeLedger};

use std::time::Duration;

/// Sync client configuration
#[derive(Clone, Debug)]
pub struct SyncClientConfig {
    /// WebSocket URL of the game server
    pub url: String,
    /// Player identity sent with every intent
    pub user_id: String,
    /// How long an optimistic intent wins over a snapshot that lacks it
    pub grace: Duration,
    pub backoff: BackoffConfig,
    /// Give up on a connection attempt after this long
    pub connect_timeout: Duration,
    /// Personal history entries kept
    pub personal_history_cap: usize,
    /// Recent stakes kept across rounds
    pub ledger_cap: usize,
    /// Buffered commands from the host
    pub command_queue: usize,
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".to_string(),
            user_id: String::new(),
            grace: Duration::from_millis(500),
            backoff: BackoffConfig::default(),
            connect_timeout: Duration::from_secs(5),
            personal_history_cap: 100,
            ledger_cap: 100,
            command_queue: 64,
        }
    }
}

/// Wall clock in Unix millis
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
