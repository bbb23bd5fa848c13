//! The single-slot worker registry.

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::process::{TerminationOutcome, WorkerHandle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Point-in-time view of a tracked worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub pid: u32,
    pub room: String,
    pub program: String,
    pub args: Vec<String>,
    pub launched_at: DateTime<Utc>,
    pub alive: bool,
}

impl From<&WorkerHandle> for WorkerStatus {
    fn from(handle: &WorkerHandle) -> Self {
        Self {
            pid: handle.pid(),
            room: handle.room().to_string(),
            program: handle.program().to_string(),
            args: handle.args().to_vec(),
            launched_at: handle.launched_at(),
            alive: handle.is_alive(),
        }
    }
}

/// The worker a bind replaced, and how stopping it went.
#[derive(Debug, Clone)]
pub struct Superseded {
    pub pid: u32,
    pub room: String,
    pub outcome: TerminationOutcome,
}

/// What [`WorkerSupervisor::bind`] did.
#[derive(Debug, Clone)]
pub struct BindReport {
    pub worker: WorkerStatus,
    /// The live worker for this room was kept instead of replaced.
    pub reused: bool,
    pub superseded: Option<Superseded>,
}

/// Owns the one "current" worker process.
///
/// The slot lock is held across terminate, launch and record, so concurrent
/// binds run one after another and the slot always names the last worker
/// launched. It is a Tokio mutex because it is held across `.await`.
///
/// That sequence runs on its own task. Dropping a `bind` future (a client
/// hanging up mid-request) leaves it running to completion.
#[derive(Debug)]
pub struct WorkerSupervisor {
    config: Arc<WorkerConfig>,
    current: Arc<Mutex<Option<WorkerHandle>>>,
}

impl WorkerSupervisor {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config: Arc::new(config),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Makes a worker for `room` the current one.
    ///
    /// Any current worker is terminated first, even one serving the same
    /// room, unless `reuse_live_worker` is set and that worker is alive.
    /// Termination problems are logged and do not stop the launch.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Launch`] if the new worker cannot be spawned.
    /// The slot is empty afterwards.
    pub async fn bind(&self, room: &str) -> Result<BindReport, WorkerError> {
        if room.trim().is_empty() {
            return Err(WorkerError::InvalidRoom("room must not be empty".to_string()));
        }

        let config = self.config.clone();
        let slot = self.current.clone();
        let room = room.to_string();
        tokio::spawn(async move { bind_slot(&config, &slot, &room).await })
            .await
            .map_err(|e| WorkerError::Interrupted(e.to_string()))?
    }

    /// Status of the current worker, if any. Waits for a running bind.
    pub async fn current(&self) -> Option<WorkerStatus> {
        self.current.lock().await.as_ref().map(WorkerStatus::from)
    }

    /// Status of the current worker without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Busy`] while a bind or shutdown holds the slot.
    pub fn try_current(&self) -> Result<Option<WorkerStatus>, WorkerError> {
        let current = self.current.try_lock().map_err(|_| WorkerError::Busy)?;
        Ok(current.as_ref().map(WorkerStatus::from))
    }

    /// Terminates the current worker and empties the slot.
    pub async fn shutdown(&self) -> Option<TerminationOutcome> {
        let config = self.config.clone();
        let slot = self.current.clone();
        let stopped = tokio::spawn(async move {
            let previous = slot.lock().await.take()?;
            Some(stop(&config, previous).await.outcome)
        })
        .await;
        match stopped {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("worker shutdown task failed: {}", e);
                None
            }
        }
    }
}

async fn bind_slot(
    config: &WorkerConfig,
    slot: &Mutex<Option<WorkerHandle>>,
    room: &str,
) -> Result<BindReport, WorkerError> {
    let mut current = slot.lock().await;

    if config.reuse_live_worker {
        if let Some(handle) = current.as_ref() {
            if handle.room() == room && handle.is_alive() {
                info!(pid = handle.pid(), room, "reusing live worker");
                return Ok(BindReport {
                    worker: WorkerStatus::from(handle),
                    reused: true,
                    superseded: None,
                });
            }
        }
    }

    let superseded = match current.take() {
        Some(previous) => Some(stop(config, previous).await),
        None => None,
    };

    let handle = match WorkerHandle::spawn(config, room) {
        Ok(handle) => handle,
        Err(e) => {
            error!(room, "failed to launch worker: {}", e);
            return Err(e);
        }
    };
    info!(
        pid = handle.pid(),
        room,
        program = %config.program,
        "started worker"
    );

    let worker = WorkerStatus::from(&handle);
    *current = Some(handle);

    Ok(BindReport {
        worker,
        reused: false,
        superseded,
    })
}

async fn stop(config: &WorkerConfig, handle: WorkerHandle) -> Superseded {
    let outcome = handle.terminate(config.grace_period()).await;
    match &outcome {
        TerminationOutcome::Terminated => {
            info!(pid = handle.pid(), room = handle.room(), "terminated previous worker");
        }
        TerminationOutcome::NotFound => {
            info!(
                pid = handle.pid(),
                room = handle.room(),
                "previous worker had already exited"
            );
        }
        TerminationOutcome::TerminationFailed(reason) => {
            warn!(
                pid = handle.pid(),
                room = handle.room(),
                reason = %reason,
                "failed to terminate previous worker"
            );
        }
    }
    Superseded {
        pid: handle.pid(),
        room: handle.room().to_string(),
        outcome,
    }
}
