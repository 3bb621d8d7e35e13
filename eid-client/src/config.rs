//! Client configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::Deserialize;

use crate::errors::ClientError;

pub const DEFAULT_BASE_URL: &str = "https://api.uriio.com/v2/";

/// Prefix of the URL advertised for beacons without a lease.
pub const DEFAULT_URL_PREFIX: &str = "http://u-c.info/";

/// Credential cache safety margin (seconds).
pub const DEFAULT_CREDENTIAL_MARGIN_SECS: u64 = 5;

/// Lease refresh safety margin (seconds).
pub const DEFAULT_LEASE_REFRESH_MARGIN_SECS: u64 = 7;

/// Default rotation exponent (period of 1024 seconds).
pub const DEFAULT_ROTATION_EXPONENT: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root; handed to the transport through [`crate::transport::Endpoint`].
    pub base_url: String,
    pub credential_margin_secs: u64,
    pub lease_refresh_margin_secs: u64,
    pub default_rotation_exponent: u8,
    pub url_prefix: String,
    /// User-Agent value transports send, via the same `Endpoint`.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            credential_margin_secs: DEFAULT_CREDENTIAL_MARGIN_SECS,
            lease_refresh_margin_secs: DEFAULT_LEASE_REFRESH_MARGIN_SECS,
            default_rotation_exponent: DEFAULT_ROTATION_EXPONENT,
            url_prefix: DEFAULT_URL_PREFIX.into(),
            user_agent: format!("eid-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON config document.
    ///
    /// # Errors
    /// Returns `ClientError::Config` on a parse or validation failure.
    pub fn from_json_str(json: &str) -> Result<Self, ClientError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `ClientError::Config` for an empty base URL or user agent.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ClientError::Config("user_agent must not be empty".into()));
        }
        Ok(())
    }
}
