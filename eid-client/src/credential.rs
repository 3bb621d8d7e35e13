//! Credential cache: a gate in front of the bearer credential.
//!
//! The cache never refreshes itself. A `None` from [`CredentialCache::get`]
//! means the caller must authenticate and then [`CredentialCache::store`]
//! the result.
//!
//! The cached value sits behind an `RwLock` and is replaced whole, so
//! readers see either the previous or the next credential, never a mix.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::clock::ClockSync;
use crate::errors::ClientError;
use crate::store::{Record, RecordKind, RecordStore, StoreError};

/// Server-issued bearer credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    /// Seconds since the UNIX epoch, server time.
    pub expire_at: u64,
}

impl Credential {
    pub fn new(token: impl Into<String>, expire_at: u64) -> Self {
        Self {
            token: token.into(),
            expire_at,
        }
    }

    /// Value for the `Authorization` header.
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"..")
            .field("expire_at", &self.expire_at)
            .finish()
    }
}

/// Observable cache state at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Absent,
    Valid,
    /// Not yet expired but inside the safety margin; `get` refuses it.
    Expiring,
    Invalid,
}

pub struct CredentialCache {
    slot: RwLock<Option<Credential>>,
    store: Arc<dyn RecordStore>,
    clock: Arc<ClockSync>,
    margin_secs: u64,
}

impl CredentialCache {
    /// Empty cache. Call [`CredentialCache::load`] to pick up a persisted
    /// credential.
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<ClockSync>, margin_secs: u64) -> Self {
        Self {
            slot: RwLock::new(None),
            store,
            clock,
            margin_secs,
        }
    }

    /// Restore the persisted credential, if any. Returns whether one was found.
    ///
    /// # Errors
    /// Propagates store read failures.
    pub fn load(&self) -> Result<bool, StoreError> {
        let persisted = self
            .store
            .query(RecordKind::Credential)?
            .into_iter()
            .find_map(|record| match record {
                Record::Credential(c) => Some(c),
                Record::Beacon(_) => None,
            });
        let found = persisted.is_some();
        *self.write_slot() = persisted;
        tracing::debug!(found, "credential cache loaded");
        Ok(found)
    }

    /// The cached credential if it outlives `now + margin`.
    pub fn get(&self) -> Option<Credential> {
        let now = self.clock.now();
        self.read_slot()
            .as_ref()
            .filter(|c| c.expire_at > now.saturating_add(self.margin_secs))
            .cloned()
    }

    /// Persist a credential, then make it the cached one.
    ///
    /// # Errors
    /// Propagates store write failures; the previous credential stays
    /// cached.
    pub fn store(&self, credential: Credential) -> Result<(), StoreError> {
        self.store.insert(&Record::Credential(credential.clone()))?;
        *self.write_slot() = Some(credential);
        tracing::debug!("credential stored");
        Ok(())
    }

    /// Forget the credential in memory and on disk.
    ///
    /// # Errors
    /// Propagates store write failures.
    pub fn clear(&self) -> Result<(), StoreError> {
        *self.write_slot() = None;
        self.store.delete(RecordKind::Credential, 0)?;
        tracing::debug!("credential cleared");
        Ok(())
    }

    /// `Authorization` header for the cached credential.
    ///
    /// # Errors
    /// `ClientError::AuthExpired` when [`CredentialCache::get`] returns none.
    pub fn auth_header(&self) -> Result<String, ClientError> {
        self.get()
            .map(|c| c.auth_header())
            .ok_or(ClientError::AuthExpired)
    }

    pub fn state(&self) -> CredentialState {
        let now = self.clock.now();
        match self.read_slot().as_ref() {
            None => CredentialState::Absent,
            Some(c) if c.expire_at > now.saturating_add(self.margin_secs) => CredentialState::Valid,
            Some(c) if c.expire_at > now => CredentialState::Expiring,
            Some(_) => CredentialState::Invalid,
        }
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, Option<Credential>> {
        self.slot.read().unwrap_or_else(|poisoned| {
            tracing::warn!("credential cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Option<Credential>> {
        self.slot.write().unwrap_or_else(|poisoned| {
            tracing::warn!("credential cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("state", &self.state())
            .field("margin_secs", &self.margin_secs)
            .finish()
    }
}
