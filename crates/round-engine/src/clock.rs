//! Round Clock
//!
//! Holds at most one armed timer. Arming a new timer replaces the previous
//! one, so a crash that arms the cooldown also cancels the multiplier tick.
//! Deadlines are `tokio::time::Instant`s, which makes the clock follow
//! tokio's paused virtual time in tests.

use crate::config::RoundConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Timer kinds, one per phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// One-shot, closes the betting window
    BettingWindow,
    /// Periodic, grows the multiplier while running
    Tick,
    /// One-shot, opens the next betting window
    Cooldown,
}

/// What the state machine asks the clock to do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEffect {
    /// Leave the armed timer as is
    Keep,
    ArmBettingWindow,
    StartTicking,
    ArmCooldown,
}

#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    kind: TimerKind,
    deadline: Instant,
}

/// Single-timer round clock
#[derive(Debug)]
pub struct RoundClock {
    betting_window: Duration,
    tick_interval: Duration,
    cooldown: Duration,
    armed: Option<ArmedTimer>,
    ticks_fired: u64,
}

impl RoundClock {
    pub fn new(config: &RoundConfig) -> Self {
        Self {
            betting_window: config.betting_window,
            tick_interval: config.tick_interval,
            cooldown: config.cooldown,
            armed: None,
            ticks_fired: 0,
        }
    }

    /// Apply a transition effect at `now`
    pub fn apply(&mut self, effect: ClockEffect, now: Instant) {
        let (kind, delay) = match effect {
            ClockEffect::Keep => return,
            ClockEffect::ArmBettingWindow => (TimerKind::BettingWindow, self.betting_window),
            ClockEffect::StartTicking => (TimerKind::Tick, self.tick_interval),
            ClockEffect::ArmCooldown => (TimerKind::Cooldown, self.cooldown),
        };

        if let Some(previous) = self.armed {
            if previous.kind != kind {
                tracing::trace!("Replacing {:?} timer with {:?}", previous.kind, kind);
            }
        }

        self.armed = Some(ArmedTimer {
            kind,
            deadline: now + delay,
        });
    }

    /// Deadline of the armed timer, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.map(|timer| timer.deadline)
    }

    pub fn armed(&self) -> Option<TimerKind> {
        self.armed.map(|timer| timer.kind)
    }

    /// Total multiplier ticks fired since creation
    pub fn ticks_fired(&self) -> u64 {
        self.ticks_fired
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    /// Fire the armed timer if its deadline has passed.
    ///
    /// One-shot timers disarm themselves. The tick re-arms at a fixed rate
    /// and skips missed intervals instead of bursting to catch up.
    pub fn fire(&mut self, now: Instant) -> Option<TimerKind> {
        let timer = self.armed?;
        if timer.deadline > now {
            return None;
        }

        match timer.kind {
            TimerKind::Tick => {
                self.ticks_fired += 1;
                let mut next = timer.deadline + self.tick_interval;
                if next <= now {
                    next = now + self.tick_interval;
                }
                self.armed = Some(ArmedTimer {
                    kind: TimerKind::Tick,
                    deadline: next,
                });
            }
            TimerKind::BettingWindow | TimerKind::Cooldown => {
                self.armed = None;
            }
        }

        Some(timer.kind)
    }
}
