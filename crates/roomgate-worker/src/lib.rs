//! Worker process lifecycle for roomgate.
//!
//! A worker is an external program that joins one LiveKit room as an
//! automated participant. The [`WorkerSupervisor`] keeps a single slot for
//! the current worker: binding a room terminates whatever worker holds the
//! slot (with its whole process group) and launches a replacement.
//!
//! Workers outlive the request that started them. Each one is reaped by a
//! background task that publishes the exit on a watch channel, so callers can
//! ask whether a worker is still alive without blocking on it.

pub mod config;
pub mod error;
pub mod process;
pub mod supervisor;

pub use config::{WorkerConfig, ROOM_PLACEHOLDER};
pub use error::WorkerError;
pub use process::{TerminationOutcome, WorkerExit, WorkerHandle};
pub use supervisor::{BindReport, Superseded, WorkerStatus, WorkerSupervisor};
