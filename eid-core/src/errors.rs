//! Error types for eid-core.
//!
//! The core is pure: every error here is raised only for malformed input
//! or an unusable primitive. Nothing is retried at this layer except the
//! degenerate shared secret loop in [`crate::crypto::establish`].

/// Key agreement and key derivation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// A key had the wrong length or cannot produce a usable agreement.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The keyed hash primitive could not be initialized or used.
    #[error("Crypto primitive unavailable: {0}")]
    Unavailable(String),
}

/// Token rotation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The synchronized clock reads earlier than the beacon epoch.
    #[error("Clock {now}s is before beacon epoch {epoch}s")]
    ClockBeforeEpoch { now: u64, epoch: u64 },
}

/// Encoding error (base64url, hex).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Encoding error: {0}")]
pub struct EncodingError(pub String);
