use std::sync::Arc;

use tokio::sync::watch;

/// Externally visible run state of one agent or swarm task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Running,
    Paused,
    Stopped,
}

/// Shared control handle. The server flips it from request handlers while
/// the run task polls it between steps. Stopped is terminal; pause and
/// resume after a stop are ignored.
#[derive(Clone)]
pub struct RunControl {
    tx: Arc<watch::Sender<ControlState>>,
}

impl RunControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ControlState::Paused
    }

    pub fn stop_requested(&self) -> bool {
        self.state() == ControlState::Stopped
    }

    pub fn pause(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Running {
                *state = ControlState::Paused;
                true
            } else {
                false
            }
        });
    }

    pub fn resume(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Paused {
                *state = ControlState::Running;
                true
            } else {
                false
            }
        });
    }

    pub fn request_stop(&self) {
        self.tx.send_if_modified(|state| {
            if *state != ControlState::Stopped {
                *state = ControlState::Stopped;
                true
            } else {
                false
            }
        });
    }

    /// Hold here while paused. Returns promptly on resume or stop.
    pub async fn wait_if_paused(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so wait_for can only fail after a drop
        // we cannot observe; either way there is nothing left to wait for.
        let _ = rx.wait_for(|state| *state != ControlState::Paused).await;
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|state| *state == ControlState::Stopped).await;
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}
