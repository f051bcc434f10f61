//! The development orchestrator.
//!
//! One [`Orchestrator`] owns everything a run needs: the supervisor, the
//! live-reload hub, the readiness signal and the code generation trigger.
//! [`Orchestrator::run`] wires them into tasks that share a single
//! cancellation token and report failures to the shutdown coordinator.

use crate::dev::codegen::{CodeGenTrigger, Disposition, SchemaGenerator};
use crate::dev::livereload::{Endpoint, LiveReloadHub, LiveReloadServer};
use crate::dev::output::{collect_stderr, consume_stdout, WebpackClassifier};
use crate::dev::shutdown::{FailureReporter, ShutdownCoordinator};
use crate::dev::watcher::{display_relative, WatchMessage};
use crate::dev::{
    FileWatcher, GenerationState, PathFilter, ProcessSupervisor, ReadinessSignal, Role,
};
use crate::error::{DevError, Result};
use crate::ui;
use appy_config::DevConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Orchestrator {
    config: DevConfig,
    root: PathBuf,
    supervisor: Arc<ProcessSupervisor>,
    hub: Arc<LiveReloadHub>,
    readiness: ReadinessSignal,
    trigger: CodeGenTrigger,
    token: CancellationToken,
    web_enabled: bool,
}

impl Orchestrator {
    /// Build an orchestrator for the project at `root`. The web dev server
    /// is enabled by default.
    ///
    /// # Errors
    ///
    /// Returns an error if a process command in `config` is empty.
    pub fn new(
        config: DevConfig,
        root: impl Into<PathBuf>,
        generator: Arc<dyn SchemaGenerator>,
    ) -> Result<Self> {
        let root = root.into();
        let supervisor = Arc::new(ProcessSupervisor::from_config(&config, &root)?);
        let trigger = CodeGenTrigger::new(
            GenerationState::new(),
            generator,
            config.generator.clone(),
            root.clone(),
        );

        Ok(Self {
            config,
            root,
            supervisor,
            hub: LiveReloadHub::new(),
            readiness: ReadinessSignal::new(),
            trigger,
            token: CancellationToken::new(),
            web_enabled: true,
        })
    }

    /// Without a web dev server the API starts immediately.
    pub fn with_web(mut self, enabled: bool) -> Self {
        self.web_enabled = enabled;
        self
    }

    /// Use an externally owned token; cancelling it stops the run cleanly.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn supervisor(&self) -> Arc<ProcessSupervisor> {
        Arc::clone(&self.supervisor)
    }

    pub fn hub(&self) -> Arc<LiveReloadHub> {
        Arc::clone(&self.hub)
    }

    pub fn readiness(&self) -> ReadinessSignal {
        self.readiness.clone()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run until a signal, a fatal failure or cancellation of the token.
    ///
    /// The first API process is only started once the web dev server has
    /// compiled successfully. If that never happens the API never starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the live-reload endpoints or the watcher cannot
    /// be started, and `DevError::Fatal` when a task reported a fatal
    /// failure.
    pub async fn run(self) -> Result<()> {
        let this = Arc::new(self);
        let mut coordinator =
            ShutdownCoordinator::new(this.token(), this.config.process.fatal_delay());
        let reporter = coordinator.reporter();

        let server = LiveReloadServer::bind(
            &this.config.live_reload,
            &this.config.http,
            &this.root,
            this.hub(),
        )
        .await?;
        if let Some(addr) = server.local_addr(Endpoint::Plain) {
            debug!("live reload listening on ws://{}{}", addr, this.config.live_reload.path);
        }
        if let Some(addr) = server.local_addr(Endpoint::Secure) {
            debug!("live reload listening on wss://{}{}", addr, this.config.live_reload.path);
        }
        tokio::spawn({
            let reporter = reporter.clone();
            let token = this.token();
            async move {
                if let Err(err) = server.run(token).await {
                    reporter.fatal(err.to_string());
                }
            }
        });

        let watch = &this.config.watch;
        let (watcher, events) = match FileWatcher::new(
            &watch.resolve_paths(&this.root),
            PathFilter::from_config(watch),
            watch.poll_interval(),
            watch.max_events,
        ) {
            Ok(started) => started,
            Err(err) => {
                this.token.cancel();
                return Err(err);
            }
        };
        info!("watching {} path(s) under {}", watcher.roots().len(), this.root.display());

        tokio::spawn(Arc::clone(&this).dispatch(events, reporter.clone()));

        if this.web_enabled {
            tokio::spawn(Arc::clone(&this).run_web(reporter.clone()));
        } else {
            this.readiness.fire();
        }

        tokio::spawn({
            let this = Arc::clone(&this);
            let reporter = reporter.clone();
            async move {
                tokio::select! {
                    _ = this.token.cancelled() => {}
                    _ = this.readiness.wait() => Arc::clone(&this).restart_api(reporter).await,
                }
            }
        });

        let reason = coordinator.wait().await?;
        coordinator
            .cascade(reason, &this.supervisor, Some(watcher))
            .await
    }

    /// Single dispatch point for watch events.
    async fn dispatch(
        self: Arc<Self>,
        mut events: mpsc::Receiver<WatchMessage>,
        reporter: FailureReporter,
    ) {
        loop {
            let message = tokio::select! {
                _ = self.token.cancelled() => break,
                message = events.recv() => message,
            };

            let event = match message {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    reporter.fatal(format!("File watcher error: {}", err));
                    break;
                }
                None => break,
            };

            debug!("{} {}", event.op, display_relative(&event.path, &self.root));

            match self.trigger.on_event(&event) {
                Disposition::Restart => {
                    tokio::spawn(Arc::clone(&self).restart_api(reporter.clone()));
                }
                Disposition::Generating(_) | Disposition::Ignored | Disposition::Suppressed => {}
            }
        }
    }

    async fn restart_api(self: Arc<Self>, reporter: FailureReporter) {
        if self.token.is_cancelled() {
            return;
        }

        ui::info("* Compiling...");
        match self.supervisor.restart(Role::Api).await {
            Ok(_) => {}
            Err(DevError::SupervisorClosed) => return,
            Err(err) => {
                reporter.fatal(err.to_string());
                return;
            }
        }

        let hub = self.hub();
        let token = self.token();
        let delay = self.config.live_reload.delay();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => hub.notify_reload(),
            }
        });
    }

    /// Start the web dev server and follow its output. Any exit that is not
    /// part of shutdown is fatal; stderr text becomes the error message.
    async fn run_web(self: Arc<Self>, reporter: FailureReporter) {
        let spawned = match self.supervisor.restart(Role::Web).await {
            Ok(spawned) => spawned,
            Err(DevError::SupervisorClosed) => return,
            Err(err) => {
                reporter.fatal(err.to_string());
                return;
            }
        };

        let readiness = self.readiness();
        let stdout = spawned.stdout;
        let stdout_done = async move {
            if let Some(stdout) = stdout {
                let mut classifier = WebpackClassifier::new();
                consume_stdout(stdout, &mut classifier, &readiness).await;
            }
        };
        let stderr = spawned.stderr;
        let stderr_text = async move {
            match stderr {
                Some(stderr) => collect_stderr(stderr).await,
                None => String::new(),
            }
        };

        let stderr_text = tokio::select! {
            _ = self.token.cancelled() => return,
            (_, text) = async { tokio::join!(stdout_done, stderr_text) } => text,
        };

        if self.token.is_cancelled() {
            return;
        }

        if stderr_text.is_empty() {
            reporter.fatal("web dev server exited unexpectedly");
        } else {
            reporter.fatal(stderr_text);
        }
    }
}
