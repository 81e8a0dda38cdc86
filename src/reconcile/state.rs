//! Subscription lifecycle: Idle → Loading → Live → Closed, with Live
//! re-entrant through Loading on room change. Transitions are validated;
//! the current state is published on a watch channel for reactive
//! consumers.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncState {
    /// No room open; also the fallback after a failed bulk load.
    Idle,
    /// Bulk read in progress.
    Loading,
    /// Authoritative list set, live subscription established.
    Live,
    /// Torn down. Re-opening a room is allowed.
    Closed,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "Idle"),
            SyncState::Loading => write!(f, "Loading"),
            SyncState::Live => write!(f, "Live"),
            SyncState::Closed => write!(f, "Closed"),
        }
    }
}

impl SyncState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (SyncState::Idle, SyncState::Loading)
                | (SyncState::Loading, SyncState::Live)
                | (SyncState::Loading, SyncState::Idle) // bulk load failed
                | (SyncState::Live, SyncState::Loading) // room change re-entry
                | (SyncState::Closed, SyncState::Loading) // reopen
                // Any state can close on teardown
                | (_, SyncState::Closed)
        )
    }
}

/// Thread-safe lifecycle tracker with watch channel for subscribers.
pub struct SyncLifecycle {
    state: RwLock<SyncState>,
    state_tx: watch::Sender<SyncState>,
    state_rx: watch::Receiver<SyncState>,
}

impl SyncLifecycle {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(SyncState::Idle);
        Self {
            state: RwLock::new(SyncState::Idle),
            state_tx,
            state_rx,
        }
    }

    pub fn current(&self) -> SyncState {
        *self.state.read()
    }

    /// Attempt a transition. Returns the new state or the rejected pair.
    pub fn transition(&self, next: SyncState) -> Result<SyncState, String> {
        let mut state = self.state.write();
        let current = *state;
        if !current.can_transition_to(next) {
            let msg = format!("invalid transition: {current} -> {next}");
            warn!("{}", msg);
            return Err(msg);
        }
        *state = next;
        let _ = self.state_tx.send(next);
        info!(from = %current, to = %next, "sync_state_transition");
        Ok(next)
    }

    /// Force Closed from any state. Idempotent.
    pub fn force_closed(&self) {
        let mut state = self.state.write();
        let prev = *state;
        *state = SyncState::Closed;
        let _ = self.state_tx.send(SyncState::Closed);
        if prev != SyncState::Closed {
            info!(from = %prev, "sync_closed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_rx.clone()
    }
}

impl Default for SyncLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
