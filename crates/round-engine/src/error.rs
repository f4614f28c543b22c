//! Round Engine Errors

use crash_protocol::Phase;
use thiserror::Error;

/// Why an intent was refused. Never sent to clients, only logged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    #[error("{intent} is not allowed during {phase}")]
    WrongPhase { intent: &'static str, phase: Phase },

    #[error("player already has a stake this round")]
    DuplicateStake,

    #[error("player has no live stake")]
    NoLiveStake,

    #[error("stake amount must be positive, got {0}")]
    InvalidAmount(f64),

    #[error("invalid cashout target {0}")]
    InvalidCashoutTarget(f64),

    #[error("empty player id")]
    EmptyPlayerId,
}

/// Engine lifecycle errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("round engine has stopped")]
    Stopped,

    #[error("invalid round config: {0}")]
    InvalidConfig(&'static str),
}
