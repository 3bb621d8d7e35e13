//! Explicitly owned client context passed to every flow.
//!
//! Holds the process-wide pieces the flows share: configuration, the
//! synchronized clock, the credential cache, the record store and the API
//! client. It also hands out one async lock per beacon so writes to the
//! same record never interleave. Different beacons never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OwnedMutexGuard;

use crate::api::ApiClient;
use crate::beacon::BeaconRecord;
use crate::clock::{ClockSync, LocalClock};
use crate::config::ClientConfig;
use crate::credential::CredentialCache;
use crate::errors::ClientError;
use crate::store::{Record, RecordId, RecordKind, RecordStore};
use crate::transport::{Endpoint, Transport};

type BeaconLocks = HashMap<RecordId, Arc<tokio::sync::Mutex<()>>>;

pub struct BeaconContext {
    pub config: ClientConfig,
    pub clock: Arc<ClockSync>,
    pub credentials: CredentialCache,
    pub store: Arc<dyn RecordStore>,
    pub api: ApiClient,
    locks: Mutex<BeaconLocks>,
}

impl BeaconContext {
    /// Build a context and restore any persisted credential.
    ///
    /// # Errors
    /// `ClientError::Config` for an invalid config, `ClientError::Storage`
    /// if the persisted credential cannot be read.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn RecordStore>,
        local_clock: Arc<dyn LocalClock>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let clock = Arc::new(ClockSync::new(local_clock));
        let credentials =
            CredentialCache::new(store.clone(), clock.clone(), config.credential_margin_secs);
        credentials.load()?;
        let api = ApiClient::new(transport, Endpoint::from(&config));
        tracing::debug!(base_url = %config.base_url, "beacon context ready");
        Ok(Self {
            config,
            clock,
            credentials,
            store,
            api,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Exclusive access to one beacon's record for the guard's lifetime.
    pub async fn lock_beacon(&self, id: RecordId) -> OwnedMutexGuard<()> {
        let lock = self.locks().entry(id).or_default().clone();
        lock.lock_owned().await
    }

    /// Persist a new beacon record and take its lock in one step, so no
    /// other flow can lock the fresh id first.
    ///
    /// # Errors
    /// Propagates store write failures.
    pub(crate) async fn insert_beacon_locked(
        &self,
        beacon: &BeaconRecord,
    ) -> Result<(RecordId, OwnedMutexGuard<()>), ClientError> {
        let (id, lock, claimed) = {
            let mut locks = self.locks();
            let id = self.store.insert(&Record::Beacon(beacon.clone()))?;
            let lock = locks.entry(id).or_default().clone();
            let claimed = lock.clone().try_lock_owned().ok();
            (id, lock, claimed)
        };
        let guard = match claimed {
            Some(guard) => guard,
            None => lock.lock_owned().await,
        };
        Ok((id, guard))
    }

    pub(crate) fn forget_beacon_lock(&self, id: RecordId) {
        self.locks().remove(&id);
    }

    /// Current stored state of one beacon.
    ///
    /// # Errors
    /// `ClientError::BeaconNotFound` if no such record exists.
    pub fn load_beacon(&self, id: RecordId) -> Result<BeaconRecord, ClientError> {
        self.beacons()?
            .into_iter()
            .find(|b| b.id == id)
            .ok_or(ClientError::BeaconNotFound(id))
    }

    /// All stored beacon records in id order.
    ///
    /// # Errors
    /// Propagates store read failures.
    pub fn beacons(&self) -> Result<Vec<BeaconRecord>, ClientError> {
        Ok(self
            .store
            .query(RecordKind::Beacon)?
            .into_iter()
            .filter_map(|record| match record {
                Record::Beacon(b) => Some(b),
                Record::Credential(_) => None,
            })
            .collect())
    }

    fn locks(&self) -> MutexGuard<'_, BeaconLocks> {
        self.locks.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("beacon lock table was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl std::fmt::Debug for BeaconContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconContext")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
