//! Error types for worker supervision.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    /// The worker process could not be spawned.
    #[error("failed to launch worker `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The room name cannot be passed to a worker.
    #[error("invalid room: {0}")]
    InvalidRoom(String),

    /// The worker command is unusable.
    #[error("invalid worker configuration: {0}")]
    InvalidConfig(String),

    /// Another bind or shutdown currently holds the worker slot.
    #[error("worker slot is busy")]
    Busy,

    /// The task running a bind panicked or was cancelled by runtime shutdown.
    #[error("worker task interrupted: {0}")]
    Interrupted(String),
}
