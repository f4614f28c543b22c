//! Round Engine - authoritative crash round
//!
//! This crate owns the single source of truth for the running game:
//! - Round clock: betting window, multiplier tick and cooldown timers
//! - Round state machine: phase transitions, stake admission, auto-cashout
//! - Engine actor: serializes intents and timer events through one task

pub mod clock;
pub mod config;
pub mod crash_point;
pub mod engine;
pub mod error;
pub mod machine;
pub mod types;

#[cfg(test)]
mod tests;

pub use clock::{ClockEffect, RoundClock, TimerKind};
pub use config::RoundConfig;
pub use crash_point::{CrashPointSampler, FixedSampler, UniformSampler};
pub use engine::{RoundEngine, RoundHandle, StateSink};
pub use error::{EngineError, RejectReason};
pub use machine::{RoundEvent, RoundStateMachine, Transition};
pub use types::{Outcome, PlayerIntent, Round, Stake};

/// Betting window length in milliseconds
pub const BETTING_WINDOW_MS: u64 = 5_000;

/// Multiplier tick interval in milliseconds (10Hz)
pub const TICK_INTERVAL_MS: u64 = 100;

/// Pause between a crash and the next betting window
pub const COOLDOWN_MS: u64 = 3_000;

/// Multiplier growth per tick
pub const MULTIPLIER_STEP: f64 = 0.01;

/// Exclusive upper bound of the crash point
pub const MAX_CRASH_POINT: f64 = 2.0;

/// Multiplier at the start of every round
pub const BASE_MULTIPLIER: f64 = 1.0;

/// Round a multiplier to two decimals
pub fn round_multiplier(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
