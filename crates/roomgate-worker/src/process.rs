//! A single supervised worker process.

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use chrono::{DateTime, Utc};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{info, warn};

#[cfg(not(unix))]
use std::sync::Arc;
#[cfg(not(unix))]
use tokio::sync::Notify;

/// How often an emptying process group is re-checked.
#[cfg(unix)]
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The process exited. The code is `None` when a signal ended it.
    Exited(Option<i32>),
    /// The exit status could not be collected.
    Lost,
}

/// Result of asking a worker to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The worker was signalled and has exited.
    Terminated,
    /// The worker had already exited.
    NotFound,
    /// Signalling failed, or the worker survived escalation.
    TerminationFailed(String),
}

impl TerminationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminated => "terminated",
            Self::NotFound => "not_found",
            Self::TerminationFailed(_) => "termination_failed",
        }
    }
}

/// Handle to a launched worker.
///
/// The process is not killed when the handle is dropped; it runs until it
/// exits on its own or [`WorkerHandle::terminate`] stops it.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: u32,
    room: String,
    program: String,
    args: Vec<String>,
    launched_at: DateTime<Utc>,
    exit_rx: watch::Receiver<Option<WorkerExit>>,
    #[cfg(not(unix))]
    kill: Arc<Notify>,
}

impl WorkerHandle {
    /// Launches the configured worker for `room`.
    ///
    /// On unix the worker leads a new process group so that it and anything
    /// it starts can be signalled together. Must be called from within a
    /// Tokio runtime.
    pub fn spawn(config: &WorkerConfig, room: &str) -> Result<Self, WorkerError> {
        if config.program.trim().is_empty() {
            return Err(WorkerError::InvalidConfig(
                "worker program must not be empty".to_string(),
            ));
        }

        let args = config.render_args(room);
        let mut std_command = std::process::Command::new(&config.program);
        std_command.args(&args).stdin(Stdio::null());
        if let Some(dir) = &config.working_dir {
            std_command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }

        let mut command = Command::from(std_command);
        command.kill_on_drop(false);

        let launch_error = |source| WorkerError::Launch {
            program: config.program.clone(),
            source,
        };
        let child = command.spawn().map_err(launch_error)?;
        let pid = child.id().ok_or_else(|| {
            launch_error(std::io::Error::other("worker exited before its pid was read"))
        })?;

        let (exit_tx, exit_rx) = watch::channel(None);

        #[cfg(unix)]
        tokio::spawn(reap(child, exit_tx, pid, room.to_string()));

        #[cfg(not(unix))]
        let kill = Arc::new(Notify::new());
        #[cfg(not(unix))]
        tokio::spawn(reap(child, exit_tx, pid, room.to_string(), kill.clone()));

        Ok(Self {
            pid,
            room: room.to_string(),
            program: config.program.clone(),
            args,
            launched_at: Utc::now(),
            exit_rx,
            #[cfg(not(unix))]
            kill,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn launched_at(&self) -> DateTime<Utc> {
        self.launched_at
    }

    pub fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// The exit, if the worker has already ended.
    pub fn exit(&self) -> Option<WorkerExit> {
        *self.exit_rx.borrow()
    }

    /// A receiver that changes to `Some` when the worker exits.
    pub fn subscribe_exit(&self) -> watch::Receiver<Option<WorkerExit>> {
        self.exit_rx.clone()
    }

    /// Waits until the worker exits.
    pub async fn wait_exit(&self) -> WorkerExit {
        let mut rx = self.exit_rx.clone();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(state) => state.unwrap_or(WorkerExit::Lost),
            Err(_) => WorkerExit::Lost,
        };
        exit
    }

    /// Stops the worker and its process group.
    ///
    /// Sends SIGTERM to the group, waits up to `grace` for every member to
    /// exit, then sends SIGKILL and waits up to `grace` for the leader. The
    /// group is signalled even after the leader has exited, so processes the
    /// worker left behind are stopped too. `NotFound` means the group was
    /// already empty.
    pub async fn terminate(&self, grace: Duration) -> TerminationOutcome {
        self.stop(grace).await
    }

    #[cfg(not(unix))]
    async fn stop(&self, grace: Duration) -> TerminationOutcome {
        if !self.is_alive() {
            return TerminationOutcome::NotFound;
        }
        self.kill.notify_one();
        match tokio::time::timeout(grace, self.wait_exit()).await {
            Ok(_) => TerminationOutcome::Terminated,
            Err(_) => TerminationOutcome::TerminationFailed(
                "worker still running after kill".to_string(),
            ),
        }
    }

    #[cfg(unix)]
    async fn stop(&self, grace: Duration) -> TerminationOutcome {
        match self.signal_group(libc::SIGTERM) {
            Ok(true) => {}
            Ok(false) => return TerminationOutcome::NotFound,
            Err(e) => return TerminationOutcome::TerminationFailed(e.to_string()),
        }

        if tokio::time::timeout(grace, self.wait_group_exit()).await.is_ok() {
            return TerminationOutcome::Terminated;
        }

        warn!(
            pid = self.pid,
            room = %self.room,
            grace_ms = grace.as_millis() as u64,
            "worker group survived SIGTERM, sending SIGKILL"
        );
        match self.signal_group(libc::SIGKILL) {
            Ok(true) => {}
            Ok(false) => return TerminationOutcome::Terminated,
            Err(e) => return TerminationOutcome::TerminationFailed(e.to_string()),
        }

        // SIGKILL cannot be ignored. Orphans that nobody reaps stay visible
        // to kill(2) as zombies, so only the leader is waited on here.
        match tokio::time::timeout(grace, self.wait_exit()).await {
            Ok(_) => TerminationOutcome::Terminated,
            Err(_) => TerminationOutcome::TerminationFailed(
                "worker still running after SIGKILL".to_string(),
            ),
        }
    }

    /// Waits for the leader to be reaped and the group to empty.
    #[cfg(unix)]
    async fn wait_group_exit(&self) {
        self.wait_exit().await;
        while let Ok(true) = self.signal_group(0) {
            tokio::time::sleep(GROUP_POLL_INTERVAL).await;
        }
    }

    /// Signals the worker's process group. `Ok(false)` if the group is gone.
    /// Signal 0 only checks that the group exists.
    #[cfg(unix)]
    fn signal_group(&self, signal: libc::c_int) -> std::io::Result<bool> {
        let pgid = i32::try_from(self.pid)
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or_else(|| std::io::Error::other(format!("invalid worker pid {}", self.pid)))?;

        // SAFETY: kill(2) has no memory-safety preconditions. A negative pid
        // addresses every process in the group.
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(true);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(false)
        } else {
            Err(err)
        }
    }
}

#[cfg(unix)]
async fn reap(
    mut child: Child,
    exit_tx: watch::Sender<Option<WorkerExit>>,
    pid: u32,
    room: String,
) {
    let status = child.wait().await;
    publish_exit(status, exit_tx, pid, &room);
}

#[cfg(not(unix))]
async fn reap(
    mut child: Child,
    exit_tx: watch::Sender<Option<WorkerExit>>,
    pid: u32,
    room: String,
    kill: Arc<Notify>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        () = kill.notified() => {
            if let Err(e) = child.start_kill() {
                warn!(pid, room = %room, "failed to kill worker: {}", e);
            }
            child.wait().await
        }
    };
    publish_exit(status, exit_tx, pid, &room);
}

fn publish_exit(
    status: std::io::Result<std::process::ExitStatus>,
    exit_tx: watch::Sender<Option<WorkerExit>>,
    pid: u32,
    room: &str,
) {
    let exit = match status {
        Ok(status) => WorkerExit::Exited(status.code()),
        Err(e) => {
            warn!(pid, room, "failed to collect worker exit status: {}", e);
            WorkerExit::Lost
        }
    };
    info!(pid, room, ?exit, "worker exited");
    // No receivers left just means nobody tracks this worker any more.
    let _ = exit_tx.send(Some(exit));
}
