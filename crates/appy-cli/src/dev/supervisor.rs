//! Lifecycle of the two supervised child processes.
//!
//! Each role (`api`, `web`) has at most one live process. A restart signals
//! the previous process group, waits for the settle delay and spawns the
//! replacement in a new process group, all while holding the role's slot so
//! two restarts of the same role cannot interleave.

use crate::error::{DevError, Result};
use appy_config::DevConfig;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Logical identity of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Api,
    Web,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Api => f.write_str("api"),
            Role::Web => f.write_str("web"),
        }
    }
}

/// How to launch one role.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Build from an argv list. Returns `None` for an empty list.
    pub fn from_argv(argv: &[String], cwd: &Path) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
            env: Vec::new(),
        })
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A live (or recently live) process owned by the supervisor.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: u32,
    pub process_group_id: i32,
    running: Arc<AtomicBool>,
}

impl ProcessHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Interrupt the whole process group so tool-spawned children go too.
    /// A group that is already gone is not an error. Once the leader has
    /// been reaped its id may be reused, so the group is left alone.
    fn signal_group(&self) {
        if !self.is_running() {
            debug!(
                "process {} already exited, not signalling group {}",
                self.pid, self.process_group_id
            );
            return;
        }

        match killpg(Pid::from_raw(self.process_group_id), Signal::SIGINT) {
            Ok(()) => debug!("sent SIGINT to process group {}", self.process_group_id),
            Err(Errno::ESRCH) => debug!("process group {} already gone", self.process_group_id),
            Err(err) => warn!(
                "failed to signal process group {}: {}",
                self.process_group_id, err
            ),
        }
    }
}

/// A freshly spawned process. Web processes carry their piped output.
#[derive(Debug)]
pub struct Spawned {
    pub handle: ProcessHandle,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Owns at most one process per [`Role`].
#[derive(Debug)]
pub struct ProcessSupervisor {
    api: Mutex<Option<ProcessHandle>>,
    web: Mutex<Option<ProcessHandle>>,
    api_command: CommandSpec,
    web_command: CommandSpec,
    settle_delay: Duration,
    closed: AtomicBool,
}

impl ProcessSupervisor {
    pub fn new(api_command: CommandSpec, web_command: CommandSpec, settle_delay: Duration) -> Self {
        Self {
            api: Mutex::new(None),
            web: Mutex::new(None),
            api_command,
            web_command,
            settle_delay,
            closed: AtomicBool::new(false),
        }
    }

    /// Commands from configuration. The web process runs in `root` with the
    /// HTTP settings exported to its environment.
    ///
    /// # Errors
    ///
    /// Returns `DevError::InvalidArgument` if either command is empty.
    pub fn from_config(config: &DevConfig, root: &Path) -> Result<Self> {
        let api = CommandSpec::from_argv(&config.process.api_command, root).ok_or_else(|| {
            DevError::InvalidArgument("process.api_command must not be empty".to_string())
        })?;
        let web = CommandSpec::from_argv(&config.process.web_command, root)
            .ok_or_else(|| {
                DevError::InvalidArgument("process.web_command must not be empty".to_string())
            })?
            .with_env(config.web_env());

        Ok(Self::new(api, web, config.process.settle_delay()))
    }

    fn slot(&self, role: Role) -> &Mutex<Option<ProcessHandle>> {
        match role {
            Role::Api => &self.api,
            Role::Web => &self.web,
        }
    }

    fn command(&self, role: Role) -> &CommandSpec {
        match role {
            Role::Api => &self.api_command,
            Role::Web => &self.web_command,
        }
    }

    /// Current handle for `role`, if any.
    pub async fn handle(&self, role: Role) -> Option<ProcessHandle> {
        self.slot(role).lock().await.clone()
    }

    /// Kill the current process of `role` and start a new one.
    ///
    /// API processes inherit stdout/stderr; web processes get pipes so their
    /// output can be classified.
    ///
    /// # Errors
    ///
    /// Returns `DevError::Spawn` if the new process cannot be started. The
    /// slot is left empty in that case. Returns `DevError::SupervisorClosed`
    /// once [`ProcessSupervisor::kill_all`] has started.
    pub async fn restart(&self, role: Role) -> Result<Spawned> {
        let mut slot = self.slot(role).lock().await;

        // Checked under the slot lock: kill_all either sees the new handle
        // or this restart sees the closed flag.
        if self.is_closed() {
            debug!("not restarting {}: supervisor closed", role);
            return Err(DevError::SupervisorClosed);
        }

        if let Some(previous) = slot.take() {
            previous.signal_group();
        }

        tokio::time::sleep(self.settle_delay).await;

        let spec = self.command(role);
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .process_group(0);

        match role {
            Role::Api => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            Role::Web => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let spawn_error = |source: std::io::Error| DevError::Spawn {
            role,
            command: spec.display(),
            source,
        };

        let mut child = command.spawn().map_err(spawn_error)?;
        let pid = child.id().ok_or_else(|| {
            spawn_error(std::io::Error::other("process exited before its pid was read"))
        })?;

        let handle = ProcessHandle {
            pid,
            // process_group(0) makes the child its own group leader
            process_group_id: pid as i32,
            running: Arc::new(AtomicBool::new(true)),
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let running = Arc::clone(&handle.running);
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!("{} process {} exited: {}", role, pid, status),
                Err(err) => warn!("failed to wait for {} process {}: {}", role, pid, err),
            }
            running.store(false, Ordering::SeqCst);
        });

        debug!("started {} process {} ({})", role, pid, spec.display());
        *slot = Some(handle.clone());

        Ok(Spawned {
            handle,
            stdout,
            stderr,
        })
    }

    /// Signal the process group of `role` and clear its handle. A no-op when
    /// nothing is running.
    pub async fn kill(&self, role: Role) {
        if let Some(handle) = self.slot(role).lock().await.take() {
            handle.signal_group();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Refuse further restarts, then kill the web process and the API
    /// process.
    pub async fn kill_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.kill(Role::Web).await;
        self.kill(Role::Api).await;
    }
}
