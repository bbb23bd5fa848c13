use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Argument token replaced with the room name when the worker is launched.
pub const ROOM_PLACEHOLDER: &str = "{room}";

fn default_program() -> String {
    "python".to_string()
}

fn default_args() -> Vec<String> {
    ["-u", "agent.py", "connect", "--room", ROOM_PLACEHOLDER]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_grace_period_ms() -> u64 {
    3000
}

/// How worker processes are launched and stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Executable to run. Looked up on `PATH` when not a path.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments. Every `{room}` is replaced with the room name; if no
    /// argument contains it the room is appended as the last argument.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory for the worker. Inherits ours when unset.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// How long a worker gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Keep a live worker when a session asks for the room it already serves.
    #[serde(default)]
    pub reuse_live_worker: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: None,
            grace_period_ms: default_grace_period_ms(),
            reuse_live_worker: false,
        }
    }
}

impl WorkerConfig {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Expands the argument list for `room`.
    pub fn render_args(&self, room: &str) -> Vec<String> {
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(ROOM_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(ROOM_PLACEHOLDER, room)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(room.to_string());
        }
        args
    }
}
