//! Session Hub - fans round snapshots out to connected sessions
//!
//! Every snapshot is serialized once and pushed into each session's bounded
//! queue with `try_send`, so a slow socket never holds up the engine task or
//! the other sessions. A session whose queue stays full for too many frames in
//! a row is evicted; its socket closes and the client reconnects and resyncs.

use crate::GameServerConfig;
use crash_protocol::{GameState, ServerMessage};
use dashmap::DashMap;
use round_engine::StateSink;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Session ID
pub type SessionId = u64;

/// Serialized text frame, shared by every session it is sent to
pub type Frame = Arc<str>;

struct Session {
    sender: mpsc::Sender<Frame>,
    missed: AtomicU32,
}

/// Hub counters for the status endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub sessions: usize,
    pub frames_published: u64,
    pub frames_dropped: u64,
    pub sessions_evicted: u64,
}

/// Registry of live sessions
pub struct SessionHub {
    sessions: DashMap<SessionId, Session>,
    next_id: AtomicU64,
    queue_size: usize,
    max_missed: u32,
    published: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

impl SessionHub {
    pub fn new(queue_size: usize, max_missed: u32) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_size: queue_size.max(1),
            max_missed,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &GameServerConfig) -> Self {
        Self::new(config.session_queue, config.max_missed)
    }

    /// Allocate an ID and the outbound queue for a new session
    pub fn open_session(&self) -> (SessionId, mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel(self.queue_size);
        (id, sender, receiver)
    }

    /// Queue the `sync` frame and start delivering updates to the session.
    ///
    /// Must run inside the engine task (see `RoundHandle::attach`) so no
    /// update can slip in between `state` and the first broadcast.
    pub fn register(&self, id: SessionId, sender: mpsc::Sender<Frame>, state: &GameState) {
        let frame: Frame = match ServerMessage::encode_sync(state) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!("Failed to encode sync frame: {}", e);
                return;
            }
        };

        // Registered before the sync goes out so counts are in place by the
        // time the client sees its first frame
        self.sessions.insert(
            id,
            Session {
                sender: sender.clone(),
                missed: AtomicU32::new(0),
            },
        );

        if sender.try_send(frame).is_err() {
            self.sessions.remove(&id);
            tracing::debug!("Session {} closed before sync", id);
            return;
        }
        tracing::debug!("Registered session {} at round {}", id, state.round_id);
    }

    /// Drop a session. Returns false if it was not registered.
    pub fn remove(&self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Send one pre-serialized frame to every session
    pub fn broadcast(&self, frame: Frame) {
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut stale = Vec::new();
        for entry in self.sessions.iter() {
            let session = entry.value();
            match session.sender.try_send(frame.clone()) {
                Ok(()) => session.missed.store(0, Ordering::Relaxed),
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    let missed = session.missed.fetch_add(1, Ordering::Relaxed) + 1;
                    if missed > self.max_missed {
                        stale.push((*entry.key(), true));
                    }
                }
                Err(TrySendError::Closed(_)) => stale.push((*entry.key(), false)),
            }
        }

        // Removal happens outside the iteration to avoid shard deadlocks
        for (id, slow) in stale {
            if self.remove(id) && slow {
                self.evicted.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Evicted session {} after {} missed frames", id, self.max_missed);
            }
        }
    }

    /// Number of registered sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            sessions: self.session_count(),
            frames_published: self.published.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            sessions_evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::from_config(&GameServerConfig::default())
    }
}

impl StateSink for SessionHub {
    fn publish(&self, state: &GameState) {
        match ServerMessage::encode_update(state) {
            Ok(json) => self.broadcast(json.into()),
            Err(e) => tracing::error!("Failed to encode {} update: {}", state.phase, e),
        }
    }
}
