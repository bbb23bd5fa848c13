use crate::error::VoiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Routing URL handed to clients when none is configured.
pub const DEFAULT_LIVEKIT_URL: &str = "wss://cloud.livekit.io";

fn default_url() -> String {
    DEFAULT_LIVEKIT_URL.to_string()
}

fn default_token_ttl_seconds() -> u64 {
    7200
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for LiveKit join tokens. Default: 7200 (2 hours).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }

    /// Whether both halves of the signing key pair are present.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_secret.trim().is_empty()
    }

    /// Checks that tokens can be signed with this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Configuration`] naming the missing value.
    pub fn validate(&self) -> Result<(), VoiceError> {
        let mut missing = Vec::new();
        if self.api_key.trim().is_empty() {
            missing.push("api_key");
        }
        if self.api_secret.trim().is_empty() {
            missing.push("api_secret");
        }
        if !missing.is_empty() {
            return Err(VoiceError::Configuration(format!(
                "missing {}",
                missing.join(", ")
            )));
        }
        if self.token_ttl_seconds == 0 {
            return Err(VoiceError::Configuration(
                "token_ttl_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }
}
