//! Reconnect backoff and policy
//!
//! Pure bookkeeping, no timers: the connection task asks for the next delay
//! and arms its own sleep.

use std::time::Duration;

/// Backoff schedule for reconnect attempts
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt
    pub initial: Duration,
    /// Growth factor applied after every attempt
    pub factor: f64,
    /// Upper bound for any single delay
    pub max: Duration,
    /// Attempts before giving up until the host signals online
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1_000),
            factor: 1.5,
            max: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// Capped exponential backoff with an attempt budget
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            attempts: 0,
            delay: config.initial.min(config.max),
            config,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;

        let delay = self.delay;
        self.delay = self.delay.mul_f64(self.config.factor.max(1.0)).min(self.config.max);
        Some(delay)
    }

    /// Back to the initial delay with a full budget
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.delay = self.config.initial.min(self.config.max);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }
}

/// What to do after the connection went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Try again after the delay
    Schedule(Duration),
    /// Budget spent, wait for the host to signal online
    Exhausted,
    /// Clean close or offline host, stay disconnected
    Idle,
}

/// Reconnect rules for a single logical connection
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    backoff: Backoff,
    online: bool,
    exhausted: bool,
}

impl ReconnectPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            backoff: Backoff::new(config),
            online: true,
            exhausted: false,
        }
    }

    /// Connection established
    pub fn on_open(&mut self) {
        self.backoff.reset();
        self.exhausted = false;
    }

    /// Connection closed or an attempt failed
    pub fn on_close(&mut self, clean: bool) -> ReconnectDecision {
        if clean || !self.online {
            return ReconnectDecision::Idle;
        }
        match self.backoff.next_delay() {
            Some(delay) => ReconnectDecision::Schedule(delay),
            None => {
                self.exhausted = true;
                ReconnectDecision::Exhausted
            }
        }
    }

    /// Host connectivity changed. Returns true when a connection attempt
    /// should start right away.
    pub fn set_online(&mut self, online: bool) -> bool {
        self.online = online;
        if online {
            self.backoff.reset();
            self.exhausted = false;
        }
        online
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }
}
