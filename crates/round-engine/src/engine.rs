//! Engine actor - the single writer of round state
//!
//! One tokio task owns the state machine and the clock. Intents, snapshot
//! queries and session attachments arrive through a bounded command channel;
//! timer deadlines are awaited in the same `select!`, so every mutation is
//! serialized. Commands are polled first: an intent queued before a tick
//! deadline is applied before that tick, up to a bounded backlog, after
//! which the due timer fires.

use crate::{
    clock::RoundClock,
    config::RoundConfig,
    crash_point::CrashPointSampler,
    error::EngineError,
    machine::{RoundEvent, RoundStateMachine, Transition},
    types::PlayerIntent,
};
use crash_protocol::{GameState, HistoryEntry};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};

/// Commands applied past a due deadline before the clock gets its turn.
/// Keeps a flood of intents from stalling ticks and phase changes.
const OVERDUE_COMMAND_LIMIT: usize = 32;

/// Receives every state-change snapshot, in order, from the engine task.
///
/// Implementations must not block: the engine calls this inline.
pub trait StateSink: Send + Sync + 'static {
    fn publish(&self, state: &GameState);
}

/// Callback run inside the engine task with the current snapshot
type AttachFn = Box<dyn FnOnce(&GameState) + Send>;

enum Command {
    Intent(PlayerIntent),
    Snapshot(oneshot::Sender<GameState>),
    History(oneshot::Sender<Vec<HistoryEntry>>),
    Attach(AttachFn),
}

/// Cloneable handle for talking to the engine task
#[derive(Clone)]
pub struct RoundHandle {
    commands: mpsc::Sender<Command>,
}

impl RoundHandle {
    /// Queue a player intent
    pub async fn submit(&self, intent: PlayerIntent) -> Result<(), EngineError> {
        self.commands
            .send(Command::Intent(intent))
            .await
            .map_err(|_| EngineError::Stopped)
    }

    /// Current client-facing snapshot
    pub async fn snapshot(&self) -> Result<GameState, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Every retained outcome, oldest first
    pub async fn history(&self) -> Result<Vec<HistoryEntry>, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::History(tx))
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Run `f` inside the engine task with the current snapshot.
    ///
    /// Nothing is published between the snapshot `f` sees and the next
    /// state change, which lets a session register with the broadcast sink
    /// and receive its sync frame without gaps or duplicates.
    pub async fn attach<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&GameState) + Send + 'static,
    {
        self.commands
            .send(Command::Attach(Box::new(f)))
            .await
            .map_err(|_| EngineError::Stopped)
    }
}

/// Engine task state
pub struct RoundEngine {
    machine: RoundStateMachine,
    clock: RoundClock,
    sink: Arc<dyn StateSink>,
    commands: mpsc::Receiver<Command>,
}

impl RoundEngine {
    /// Create the engine and a handle to it
    pub fn new(
        config: RoundConfig,
        sampler: Box<dyn CrashPointSampler>,
        sink: Arc<dyn StateSink>,
    ) -> Result<(Self, RoundHandle), EngineError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.command_queue);
        let engine = Self {
            clock: RoundClock::new(&config),
            machine: RoundStateMachine::new(config, sampler),
            sink,
            commands: rx,
        };

        Ok((engine, RoundHandle { commands: tx }))
    }

    /// Create the engine and spawn it on the current runtime
    pub fn spawn(
        config: RoundConfig,
        sampler: Box<dyn CrashPointSampler>,
        sink: Arc<dyn StateSink>,
    ) -> Result<(RoundHandle, JoinHandle<()>), EngineError> {
        let (engine, handle) = Self::new(config, sampler, sink)?;
        Ok((handle, tokio::spawn(engine.run())))
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        tracing::info!("Round engine started");

        let opened = self.machine.open_betting(wall_clock_ms());
        self.apply(opened, Instant::now());

        // Commands handled while the armed deadline was already due
        let mut overdue = 0usize;

        loop {
            let deadline = self.clock.deadline();

            tokio::select! {
                biased;

                command = self.commands.recv(), if overdue < OVERDUE_COMMAND_LIMIT => match command {
                    Some(command) => {
                        self.handle_command(command);
                        if deadline.is_some_and(|d| d <= Instant::now()) {
                            overdue += 1;
                        }
                    }
                    None => break,
                },

                _ = wait_until(deadline) => {
                    overdue = 0;
                    let now = Instant::now();
                    if let Some(kind) = self.clock.fire(now) {
                        let transition = self.machine.handle(RoundEvent::from(kind), wall_clock_ms());
                        self.apply(transition, now);
                    }
                }
            }
        }

        self.clock.disarm();
        tracing::info!(
            "Round engine stopped at round {} after {} ticks",
            self.machine.round().id,
            self.clock.ticks_fired()
        );
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Intent(intent) => {
                let player = intent.player_id().to_string();
                let name = intent.name();
                match self
                    .machine
                    .handle(RoundEvent::Intent(intent), wall_clock_ms())
                {
                    Transition::Rejected(reason) => {
                        tracing::debug!("Rejected {} from {}: {}", name, player, reason);
                    }
                    transition => self.apply(transition, Instant::now()),
                }
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.machine.snapshot());
            }
            Command::History(reply) => {
                let _ = reply.send(self.machine.history());
            }
            Command::Attach(f) => f(&self.machine.snapshot()),
        }
    }

    fn apply(&mut self, transition: Transition, now: Instant) {
        match transition {
            Transition::Changed { snapshot, effect } => {
                self.clock.apply(effect, now);
                self.sink.publish(&snapshot);
            }
            Transition::Rejected(reason) => {
                tracing::debug!("Rejected event: {}", reason);
            }
            Transition::Ignored => {
                tracing::trace!("Ignored stale event in {}", self.machine.phase());
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn wall_clock_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
