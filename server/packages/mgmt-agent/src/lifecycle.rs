use std::sync::Mutex;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    ShuttingDown,
    Closed,
}

/// `Running -> ShuttingDown -> Closed`, entered at most once.
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    closed: watch::Sender<bool>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (closed, _rx) = watch::channel(false);
        Self {
            state: Mutex::new(LifecycleState::Running),
            closed,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Returns `true` for exactly one caller, which then owns teardown.
    pub fn begin_shutdown(&self) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state != LifecycleState::Running {
            return false;
        }
        *state = LifecycleState::ShuttingDown;
        true
    }

    pub fn finish_shutdown(&self) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = LifecycleState::Closed;
        self.closed.send_replace(true);
    }

    /// Resolves once teardown has completed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
