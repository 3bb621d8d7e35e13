//! Transport port: an opaque asynchronous request/response function.
//!
//! HTTP and JSON framing live behind this trait. A call resolves exactly
//! once, with either a JSON body or a [`TransportError`]. Timeouts, if any,
//! belong to the implementation.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::errors::TransportError;

/// Where requests go and how the client identifies itself. Passed with
/// every request; transports resolve paths with [`Endpoint::url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub user_agent: String,
}

impl Endpoint {
    /// Absolute URL of an API path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl From<&ClientConfig> for Endpoint {
    fn from(config: &ClientConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request. `path` is relative to `endpoint.base_url`;
    /// `auth` is the full `Authorization` header value.
    async fn request(
        &self,
        endpoint: &Endpoint,
        method: Method,
        path: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value, TransportError>;
}
