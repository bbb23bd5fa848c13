//! LiveKit credentials for roomgate.
//!
//! Holds the signing key pair configuration and mints the short-lived join
//! tokens handed to clients. A token is a JWT signed with the API secret and
//! carries a fixed grant: join the named room, publish and subscribe to
//! media, and publish data. Tokens are verified by the LiveKit server, not by
//! this crate, and cannot be revoked short of rotating the secret.

pub mod config;
pub mod error;
pub mod grant;

pub use config::{LiveKitConfig, DEFAULT_LIVEKIT_URL};
pub use error::VoiceError;
pub use grant::{GrantMinter, Permission, JOIN_PERMISSIONS};
