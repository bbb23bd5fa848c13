//! Session issuance: default names, join token, worker binding.

use crate::sequence::CounterError;
use crate::AppState;
use roomgate_voice::VoiceError;
use roomgate_worker::BindReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

/// Query parameters for `GET /token`.
#[derive(Debug, Default, Deserialize)]
pub struct SessionRequest {
    pub identity: Option<String>,
    pub room: Option<String>,
}

/// A join token plus what the client needs to use it.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    /// LiveKit server the client connects to.
    pub url: String,
    pub room: String,
    pub identity: String,
    pub worker: WorkerState,
}

/// Whether a worker is attached to the session's room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerState {
    Started { pid: u32 },
    Reused { pid: u32 },
    Failed { error: String },
}

impl From<&BindReport> for WorkerState {
    fn from(report: &BindReport) -> Self {
        if report.reused {
            Self::Reused {
                pid: report.worker.pid,
            }
        } else {
            Self::Started {
                pid: report.worker.pid,
            }
        }
    }
}

/// Errors that stop a session from being issued.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Signing(String),

    #[error(transparent)]
    Storage(#[from] CounterError),
}

impl From<VoiceError> for SessionError {
    fn from(e: VoiceError) -> Self {
        match e {
            VoiceError::Configuration(_) => Self::Configuration(e.to_string()),
            VoiceError::InvalidInput(_) => Self::InvalidInput(e.to_string()),
            VoiceError::Signing(_) => Self::Signing(e.to_string()),
        }
    }
}

fn provided(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Issues a session for the requested identity and room.
///
/// Missing or blank values get a shared generated name `<prefix>-<n>` from
/// one counter increment. Signing configuration is checked before the
/// counter is touched, so a misconfigured server never burns values.
///
/// A worker launch failure does not fail the session: the token is still
/// returned and `worker` reports the failure.
pub async fn create_session(
    state: &AppState,
    request: SessionRequest,
) -> Result<SessionResponse, SessionError> {
    let identity = provided(request.identity);
    let room = provided(request.room);

    state.minter.ensure_configured()?;

    let (identity, room) = match (identity, room) {
        (Some(identity), Some(room)) => (identity, room),
        (identity, room) => {
            let n = state.counter.next().await.map_err(|e| {
                error!("failed to advance sequence counter: {}", e);
                e
            })?;
            let generated = format!("{}-{}", state.name_prefix, n);
            (
                identity.unwrap_or_else(|| generated.clone()),
                room.unwrap_or(generated),
            )
        }
    };

    let access_token = state
        .minter
        .mint_join_token(&identity, &room)
        .map_err(|e| {
            error!(identity = %identity, room = %room, "failed to generate token: {}", e);
            SessionError::from(e)
        })?;

    info!(identity = %identity, room = %room, "generated token");

    let worker = match state.supervisor.bind(&room).await {
        Ok(report) => WorkerState::from(&report),
        Err(e) => {
            warn!(room = %room, "session issued without a worker: {}", e);
            WorkerState::Failed {
                error: e.to_string(),
            }
        }
    };

    Ok(SessionResponse {
        access_token,
        url: state.minter.url().to_string(),
        room,
        identity,
        worker,
    })
}
