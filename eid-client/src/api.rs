//! Typed API client over a [`Transport`].
//!
//! Request and response bodies are the camelCase JSON models the service
//! speaks. A body that is valid JSON but the wrong shape becomes
//! `ClientError::Malformed`.

use std::sync::Arc;

use eid_core::constants::PUBLIC_KEY_LENGTH;
use eid_core::encoding::from_base64url_array;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ClientError;
use crate::transport::{Endpoint, Method, Transport};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub firebase_id_token: String,
}

#[derive(Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Credential lifetime in seconds.
    pub expires: u64,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"..")
            .field("expires", &self.expires)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ServerClock {
    /// Server time, epoch millis.
    pub now: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationParams {
    pub service_ecdh_public_key: String,
}

impl RegistrationParams {
    /// Decoded server public key.
    ///
    /// # Errors
    /// `ClientError::Malformed` unless the key is 32 bytes of base64url.
    pub fn server_public_key(&self) -> Result<[u8; PUBLIC_KEY_LENGTH], ClientError> {
        Ok(from_base64url_array(&self.service_ecdh_public_key)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBeacon {
    pub service_ecdh_public_key: String,
    pub beacon_ecdh_public_key: String,
    /// base64url of the full 10-byte counter-0 token.
    pub initial_eid: String,
    pub initial_clock_value: u64,
    pub rotation_period_exponent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Beacon as the server sees it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteBeacon {
    pub id: String,
    /// Microseconds since the UNIX epoch.
    pub epoch: u64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub tag: Option<String>,
}

impl RemoteBeacon {
    pub fn epoch_seconds(&self) -> u64 {
        self.epoch / 1_000_000
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub token: String,
    pub ttl: u32,
    pub num_to_issue: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShortUrl {
    pub url: String,
    /// Epoch millis; absent when the URL never expires.
    #[serde(default)]
    pub expire: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShortUrls {
    #[serde(default)]
    pub items: Vec<ShortUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub beacon: String,
    #[serde(default)]
    pub valid_since: Option<String>,
    #[serde(default)]
    pub valid_until: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Endpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, ClientError> {
        tracing::trace!(%method, path, "api request");
        let response = self
            .transport
            .request(&self.endpoint, method, path, auth, body)
            .await?;
        serde_json::from_value(response)
            .map_err(|e| ClientError::Malformed(format!("{method} {path}: {e}")))
    }

    fn body<B: Serialize>(body: &B) -> Result<Value, ClientError> {
        serde_json::to_value(body).map_err(|e| ClientError::Malformed(e.to_string()))
    }

    /// Exchange an external identity assertion for a bearer credential.
    pub async fn authenticate(&self, assertion: &str) -> Result<AccessToken, ClientError> {
        let body = Self::body(&AuthRequest {
            firebase_id_token: assertion.to_owned(),
        })?;
        self.call(Method::Post, "auth", None, Some(body)).await
    }

    pub async fn server_clock(&self) -> Result<ServerClock, ClientError> {
        self.call(Method::Get, "clock", None, None).await
    }

    pub async fn registration_params(&self, auth: &str) -> Result<RegistrationParams, ClientError> {
        self.call(Method::Get, "params", Some(auth), None).await
    }

    pub async fn register_beacon(
        &self,
        auth: &str,
        request: &RegisterBeacon,
    ) -> Result<RemoteBeacon, ClientError> {
        let body = Self::body(request)?;
        self.call(Method::Post, "beacons", Some(auth), Some(body)).await
    }

    pub async fn fetch_beacon(&self, auth: &str, server_id: &str) -> Result<RemoteBeacon, ClientError> {
        self.call(Method::Get, &format!("beacons/{server_id}"), Some(auth), None)
            .await
    }

    /// Apply a partial update (for example `{"active": false}`) to a
    /// registered beacon.
    pub async fn update_beacon(
        &self,
        auth: &str,
        server_id: &str,
        patch: Value,
    ) -> Result<RemoteBeacon, ClientError> {
        self.call(Method::Put, &format!("beacons/{server_id}"), Some(auth), Some(patch))
            .await
    }

    pub async fn check_token(&self, auth: &str, token: &str) -> Result<TokenInfo, ClientError> {
        self.call(Method::Get, &format!("eid/{token}"), Some(auth), None)
            .await
    }

    pub async fn issue_short_urls(
        &self,
        auth: &str,
        url_id: u64,
        request: &IssueRequest,
    ) -> Result<ShortUrls, ClientError> {
        let body = Self::body(request)?;
        self.call(
            Method::Post,
            &format!("urls/{url_id}/issue"),
            Some(auth),
            Some(body),
        )
        .await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").finish_non_exhaustive()
    }
}
