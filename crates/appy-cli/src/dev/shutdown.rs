//! Single owner of the stop sequence.
//!
//! Tasks never kill processes themselves. They report fatal conditions
//! through a [`FailureReporter`]; the coordinator then cancels the shared
//! token, kills both process groups and closes the watcher.

use crate::dev::{FileWatcher, ProcessSupervisor};
use crate::error::{DevError, Result};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Why the orchestrator is stopping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(&'static str),
    /// The shared token was cancelled by its owner.
    Requested,
    Fatal(String),
}

/// Handle given to tasks for reporting unrecoverable failures.
#[derive(Debug, Clone)]
pub struct FailureReporter {
    tx: mpsc::UnboundedSender<String>,
}

impl FailureReporter {
    pub fn fatal(&self, message: impl Into<String>) {
        let message = message.into();
        error!("fatal: {}", message);
        // The coordinator may already be gone during shutdown.
        let _ = self.tx.send(message);
    }
}

#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
    fatal_delay: Duration,
}

impl ShutdownCoordinator {
    pub fn new(token: CancellationToken, fatal_delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            token,
            tx,
            rx,
            fatal_delay,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn reporter(&self) -> FailureReporter {
        FailureReporter {
            tx: self.tx.clone(),
        }
    }

    /// Wait for SIGINT, SIGTERM, cancellation of the token or a fatal report,
    /// whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handlers cannot be installed.
    pub async fn wait(&mut self) -> Result<ShutdownReason> {
        let mut sigterm = signal(SignalKind::terminate())?;

        let reason = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                ShutdownReason::Signal("SIGINT")
            }
            _ = sigterm.recv() => ShutdownReason::Signal("SIGTERM"),
            _ = self.token.cancelled() => ShutdownReason::Requested,
            Some(message) = self.rx.recv() => ShutdownReason::Fatal(message),
        };

        debug!("shutting down: {:?}", reason);
        Ok(reason)
    }

    /// Stop everything: cancel the token, kill web then api, close the
    /// watcher. A fatal reason waits `fatal_delay` so the children can
    /// flush their output, then becomes the returned error.
    ///
    /// # Errors
    ///
    /// Returns `DevError::Fatal` carrying the reported message.
    pub async fn cascade(
        &self,
        reason: ShutdownReason,
        supervisor: &ProcessSupervisor,
        watcher: Option<FileWatcher>,
    ) -> Result<()> {
        self.token.cancel();
        supervisor.kill_all().await;
        if let Some(watcher) = watcher {
            watcher.close();
        }

        match reason {
            ShutdownReason::Fatal(message) => {
                tokio::time::sleep(self.fatal_delay).await;
                Err(DevError::Fatal(message))
            }
            ShutdownReason::Signal(_) | ShutdownReason::Requested => Ok(()),
        }
    }
}
