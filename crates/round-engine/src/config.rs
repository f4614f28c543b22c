//! Round configuration

use crate::{
    error::EngineError, BASE_MULTIPLIER, BETTING_WINDOW_MS, COOLDOWN_MS, MAX_CRASH_POINT,
    MULTIPLIER_STEP, TICK_INTERVAL_MS,
};
use crash_protocol::SURFACED_HISTORY;
use std::time::Duration;

/// Round timing and payout configuration
#[derive(Clone, Debug)]
pub struct RoundConfig {
    /// How long stakes are accepted before the round starts
    pub betting_window: Duration,
    /// Multiplier tick interval while running
    pub tick_interval: Duration,
    /// Pause after a crash before the next betting window
    pub cooldown: Duration,
    /// Multiplier increment per tick
    pub multiplier_step: f64,
    /// Exclusive upper bound for sampled crash points
    pub max_crash_point: f64,
    /// Outcomes kept in memory
    pub history_retained: usize,
    /// Outcomes included in every snapshot
    pub history_surfaced: usize,
    /// Capacity of the engine command queue
    pub command_queue: usize,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            betting_window: Duration::from_millis(BETTING_WINDOW_MS),
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            cooldown: Duration::from_millis(COOLDOWN_MS),
            multiplier_step: MULTIPLIER_STEP,
            max_crash_point: MAX_CRASH_POINT,
            history_retained: 100,
            history_surfaced: SURFACED_HISTORY,
            command_queue: 1024,
        }
    }
}

impl RoundConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.tick_interval.is_zero() {
            return Err(EngineError::InvalidConfig("tick interval must be non-zero"));
        }
        if !(self.multiplier_step.is_finite() && self.multiplier_step > 0.0) {
            return Err(EngineError::InvalidConfig("multiplier step must be positive"));
        }
        if !(self.max_crash_point.is_finite() && self.max_crash_point > BASE_MULTIPLIER) {
            return Err(EngineError::InvalidConfig("max crash point must exceed 1.00"));
        }
        if self.history_retained < self.history_surfaced {
            return Err(EngineError::InvalidConfig(
                "retained history must cover surfaced history",
            ));
        }
        if self.command_queue == 0 {
            return Err(EngineError::InvalidConfig("command queue must be non-empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RoundConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_degenerate_crash_bound() {
        let config = RoundConfig {
            max_crash_point: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
