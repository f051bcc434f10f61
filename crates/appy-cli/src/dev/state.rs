//! Shared orchestrator state.
//!
//! Two pieces of state cross task boundaries: the `generating` flag that keeps
//! code generation and restarts apart, and the one-shot readiness signal the
//! web dev server raises after its first successful compile.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Re-entrancy guard for code generation.
#[derive(Debug, Default)]
pub struct GenerationState {
    generating: Mutex<bool>,
}

impl GenerationState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_generating(&self) -> bool {
        *self.generating.lock()
    }

    /// Set the flag if it is clear. The returned guard clears it on drop,
    /// including when the generator fails or panics.
    pub fn try_begin(self: &Arc<Self>) -> Option<GenerationGuard> {
        let mut generating = self.generating.lock();
        if *generating {
            return None;
        }
        *generating = true;
        Some(GenerationGuard {
            state: Arc::clone(self),
        })
    }
}

/// Holds the `generating` flag for the duration of one generator run.
#[derive(Debug)]
pub struct GenerationGuard {
    state: Arc<GenerationState>,
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        *self.state.generating.lock() = false;
    }
}

/// One-shot flag raised when the web dev server first compiles successfully.
#[derive(Debug, Clone)]
pub struct ReadinessSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Returns `true` only for the call that raised it.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is raised. There is no timeout: a dev server that
    /// never compiles keeps the waiter parked.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}
