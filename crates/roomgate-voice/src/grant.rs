use crate::config::LiveKitConfig;
use crate::error::VoiceError;
use livekit_api::access_token::{AccessToken, VideoGrants};
use std::time::Duration;
use tracing::debug;

/// A single capability carried in a join token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Join,
    PublishMedia,
    SubscribeMedia,
    PublishData,
}

/// The permission set every join token carries. There is no partial mode.
pub const JOIN_PERMISSIONS: [Permission; 4] = [
    Permission::Join,
    Permission::PublishMedia,
    Permission::SubscribeMedia,
    Permission::PublishData,
];

fn video_grants(room: &str, permissions: &[Permission]) -> VideoGrants {
    let mut grants = VideoGrants {
        room: room.to_string(),
        ..Default::default()
    };
    for permission in permissions {
        match permission {
            Permission::Join => grants.room_join = true,
            Permission::PublishMedia => grants.can_publish = true,
            Permission::SubscribeMedia => grants.can_subscribe = true,
            Permission::PublishData => grants.can_publish_data = true,
        }
    }
    grants
}

/// Mints signed LiveKit join tokens with the process-wide key pair.
#[derive(Debug, Clone)]
pub struct GrantMinter {
    config: LiveKitConfig,
}

impl GrantMinter {
    pub fn new(config: LiveKitConfig) -> Self {
        Self { config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.has_credentials()
    }

    /// Fails with [`VoiceError::Configuration`] if the key pair is incomplete.
    pub fn ensure_configured(&self) -> Result<(), VoiceError> {
        self.config.validate()
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn token_ttl(&self) -> Duration {
        self.config.token_ttl()
    }

    /// Mints a join token for `identity` in `room` using the configured TTL.
    pub fn mint_join_token(&self, identity: &str, room: &str) -> Result<String, VoiceError> {
        self.mint(identity, room, self.config.token_ttl())
    }

    /// Mints a join token for `identity` in `room` that expires `ttl` from now.
    ///
    /// The participant display name is set to the identity.
    pub fn mint(&self, identity: &str, room: &str, ttl: Duration) -> Result<String, VoiceError> {
        self.ensure_configured()?;

        if identity.trim().is_empty() {
            return Err(VoiceError::InvalidInput("identity must not be empty".to_string()));
        }
        if room.trim().is_empty() {
            return Err(VoiceError::InvalidInput("room must not be empty".to_string()));
        }
        // Token expiry has whole-second resolution.
        if ttl.as_secs() == 0 {
            return Err(VoiceError::InvalidInput(
                "ttl must be at least one second".to_string(),
            ));
        }

        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(identity)
            .with_name(identity)
            .with_grants(video_grants(room, &JOIN_PERMISSIONS))
            .with_ttl(ttl);

        let jwt = token.to_jwt()?;
        debug!(identity, room, ttl_secs = ttl.as_secs(), "minted join token");
        Ok(jwt)
    }
}
