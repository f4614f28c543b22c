//! Crash Protocol - JSON wire format for the crash round
//!
//! Shared between the authoritative server and its sync clients:
//! - Server → client: `sync` on connect, then one phase-tagged snapshot per state change
//! - Client → server: `bet`, `cashout` and `cancel` intents

pub mod error;
pub mod messages;

pub use error::ProtocolError;
pub use messages::{
    BetRequest, BetView, ClientMessage, GameState, HistoryEntry, Phase, PlayerRequest,
    ServerMessage,
};

/// Number of round outcomes surfaced to clients in every snapshot
pub const SURFACED_HISTORY: usize = 10;
