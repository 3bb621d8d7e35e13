//! Beacon records and short URL leases.
//!
//! A [`BeaconRecord`] owns its identity key and, optionally, one [`Lease`].
//! Flows see a beacon only through [`RotatingBeacon`].

use eid_core::encoding::{from_hex_array, to_hex};
use eid_core::identity::IdentityKey;
use eid_core::token::{compute_token, encode_token, Token};
use eid_core::TokenError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::store::RecordId;

/// Server registration progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    /// Created locally, not yet accepted by the server. Deletable.
    Unregistered,
    /// Accepted by the server; epoch and server id are authoritative.
    Registered,
}

/// Advertising status as last observed by the flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalStatus {
    Idle,
    /// Broadcasting.
    Active,
    /// The last lease refresh failed; the previous lease is kept.
    UpdateFailed,
}

/// Time-bound short URL a beacon advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub url_id: u64,
    pub url_token: String,
    /// Seconds each issued URL lives; 0 = never expires.
    pub time_to_live: u32,
    pub short_url: Option<String>,
    /// Epoch millis; 0 = no deadline.
    pub expire_at: u64,
}

impl Lease {
    /// A lease with nothing issued yet.
    pub fn new(url_id: u64, url_token: impl Into<String>, time_to_live: u32) -> Self {
        Self {
            url_id,
            url_token: url_token.into(),
            time_to_live,
            short_url: None,
            expire_at: 0,
        }
    }

    /// Milliseconds left before expiry, `None` when there is no deadline.
    pub fn millis_until_expiry(&self, now_millis: u64) -> Option<i64> {
        if self.expire_at == 0 {
            None
        } else {
            Some(self.expire_at as i64 - now_millis as i64)
        }
    }

    /// Missing, stale, or within `margin_secs` of expiring.
    pub fn needs_refresh(&self, now_millis: u64, margin_secs: u64) -> bool {
        if self.short_url.is_none() {
            return true;
        }
        match self.millis_until_expiry(now_millis) {
            None => false,
            Some(left) => left < i64::try_from(margin_secs.saturating_mul(1000)).unwrap_or(i64::MAX),
        }
    }

    /// Instant (epoch millis) at which a refresh becomes due.
    pub fn scheduled_refresh_at(&self, margin_secs: u64) -> Option<u64> {
        if self.expire_at == 0 {
            None
        } else {
            Some(self.expire_at.saturating_sub(margin_secs.saturating_mul(1000)))
        }
    }

    /// Replace the issued URL and deadline together.
    pub fn renew(&mut self, short_url: String, expire_at: u64) {
        self.short_url = Some(short_url);
        self.expire_at = expire_at;
    }

    /// Drop the issued URL so the next advertise forces a re-issue.
    pub fn invalidate(&mut self) {
        self.short_url = None;
        self.expire_at = 0;
    }
}

/// A provisioned rotating beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconRecord {
    /// Local record id, assigned by the store on insert.
    pub id: RecordId,
    #[serde(serialize_with = "serialize_key", deserialize_with = "deserialize_key")]
    pub identity_key: IdentityKey,
    /// Rotation period is `2^rotation_exponent` seconds.
    pub rotation_exponent: u8,
    /// Seconds since the UNIX epoch; 0 until registered.
    pub epoch: u64,
    pub server_id: Option<String>,
    pub state: RegistrationState,
    pub status: OperationalStatus,
    pub tag: Option<String>,
    pub lease: Option<Lease>,
}

impl BeaconRecord {
    /// Fresh local record right after key derivation.
    pub fn unregistered(identity_key: IdentityKey, rotation_exponent: u8, tag: Option<String>) -> Self {
        Self {
            id: 0,
            identity_key,
            rotation_exponent,
            epoch: 0,
            server_id: None,
            state: RegistrationState::Unregistered,
            status: OperationalStatus::Idle,
            tag,
            lease: None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// Apply the server's acceptance. `epoch` is in seconds.
    pub fn commit(&mut self, server_id: String, epoch: u64) {
        self.server_id = Some(server_id);
        self.epoch = epoch;
        self.state = RegistrationState::Registered;
    }
}

/// Operations the registration and lease flows need from a beacon.
pub trait RotatingBeacon {
    /// Raw token for the period containing `now_seconds`.
    ///
    /// # Errors
    /// `TokenError::ClockBeforeEpoch` if the clock reads before the epoch.
    fn compute_token(&self, now_seconds: u64) -> Result<Token, TokenError>;

    /// Encoded 13-character token for `now_seconds`.
    ///
    /// # Errors
    /// See [`RotatingBeacon::compute_token`].
    fn encoded_token(&self, now_seconds: u64) -> Result<String, TokenError> {
        self.compute_token(now_seconds).map(|t| encode_token(&t))
    }

    fn lease(&self) -> Option<&Lease>;

    fn mark_degraded(&mut self);
}

impl RotatingBeacon for BeaconRecord {
    fn compute_token(&self, now_seconds: u64) -> Result<Token, TokenError> {
        compute_token(
            &self.identity_key,
            self.rotation_exponent,
            self.epoch,
            now_seconds,
        )
    }

    fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    fn mark_degraded(&mut self) {
        self.status = OperationalStatus::UpdateFailed;
    }
}

fn serialize_key<S: Serializer>(key: &IdentityKey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&to_hex(key.as_bytes()))
}

fn deserialize_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<IdentityKey, D::Error> {
    let hex = String::deserialize(deserializer)?;
    from_hex_array(&hex)
        .map(IdentityKey::from_bytes)
        .map_err(serde::de::Error::custom)
}
