//! Error types for eid-client.
//!
//! Flows convert every lower-level failure into one [`ClientError`] kind
//! before reporting. Only registration performs a rollback on failure.

use eid_core::errors::{CryptoError, EncodingError, TokenError};

use crate::store::{RecordId, StoreError};

/// Failure reported by a [`crate::transport::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

/// Unified error type for client flows.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure. Retryable at the caller's discretion.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Registration or issuance explicitly refused by the server.
    #[error("Server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// No cached credential outside the safety margin. Never sent over
    /// the network.
    #[error("Access credential expired")]
    AuthExpired,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Beacon {0} not found")]
    BeaconNotFound(RecordId),

    #[error("Beacon {0} is not registered")]
    NotRegistered(RecordId),

    #[error("Beacon {0} has no short URL lease")]
    NoLease(RecordId),

    /// A response parsed as JSON but not into the expected shape.
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Transport failures may succeed on a later attempt; nothing else will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::NetworkFailure(_))
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(message) => ClientError::NetworkFailure(message),
            TransportError::Http { status, message } => {
                ClientError::ServerRejected { status, message }
            }
        }
    }
}

impl From<EncodingError> for ClientError {
    fn from(err: EncodingError) -> Self {
        ClientError::Malformed(err.to_string())
    }
}
