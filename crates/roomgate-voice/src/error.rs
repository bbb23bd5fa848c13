use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("LiveKit credentials not configured: {0}")]
    Configuration(String),

    #[error("invalid grant request: {0}")]
    InvalidInput(String),

    #[error("failed to sign access token: {0}")]
    Signing(#[from] livekit_api::access_token::AccessTokenError),
}
