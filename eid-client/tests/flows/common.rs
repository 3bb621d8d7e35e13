//! Test doubles and fixtures shared by the flow scenarios.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eid_client::{
    Advertisement, Advertiser, BeaconContext, BeaconRecord, ClientConfig, Credential, ManualClock,
    Endpoint, MemoryStore, Method, NewBeacon, Record, RecordId, RecordKind, RecordStore, Transport,
    TransportError,
};
use eid_client::store::{FieldSet, StoreError};
use eid_core::crypto::{agree, generate_keypair, KeyExchange, KeyPair, SharedSecret};
use eid_core::encoding::{from_base64url_array, to_base64url};
use eid_core::identity::{derive_identity_key, IdentityKey};
use serde_json::{json, Value};

/// Synchronized "now" every scenario starts at, in seconds.
pub const NOW: u64 = 1_700_000_000;
pub const NOW_MS: u64 = NOW * 1000;

/// Server epoch returned on registration: 1000 s before `NOW`, in µs.
pub const SERVER_EPOCH_US: u64 = (NOW - 1000) * 1_000_000 + 123_456;
pub const SERVER_EPOCH: u64 = NOW - 1000;

pub const BEARER: &str = "Bearer access-token";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub url: String,
    pub user_agent: String,
    pub auth: Option<String>,
    pub body: Option<Value>,
}

type Route = (Method, String);

/// Answers each (method, path) from its own FIFO of scripted replies.
/// An unscripted request panics. Every request yields once before
/// answering so concurrent callers interleave.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<Route, VecDeque<Result<Value, TransportError>>>>,
    requests: Mutex<Vec<Recorded>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn reply(&self, method: Method, path: &str, reply: Result<Value, TransportError>) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_owned()))
            .or_default()
            .push_back(reply);
    }

    pub fn ok(&self, method: Method, path: &str, body: Value) {
        self.reply(method, path, Ok(body));
    }

    pub fn http_error(&self, method: Method, path: &str, status: u16, message: &str) {
        self.reply(
            method,
            path,
            Err(TransportError::Http {
                status,
                message: message.into(),
            }),
        );
    }

    /// Most requests ever outstanding at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(
        &self,
        endpoint: &Endpoint,
        method: Method,
        path: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(Recorded {
            method,
            path: path.to_owned(),
            url: endpoint.url(path),
            user_agent: endpoint.user_agent.clone(),
            auth: auth.map(str::to_owned),
            body,
        });
        let outstanding = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(outstanding, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.routes
            .lock()
            .unwrap()
            .get_mut(&(method, path.to_owned()))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("unscripted request: {method} {path}"))
    }
}

/// [`MemoryStore`] whose writes can be switched to fail.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    failing_inserts: Mutex<Vec<RecordKind>>,
    failing_updates: Mutex<FieldSet>,
}

impl FailingStore {
    pub fn fail_inserts(&self, kind: RecordKind) {
        self.failing_inserts.lock().unwrap().push(kind);
    }

    /// Fail every update that writes any of `fields`.
    pub fn fail_updates(&self, fields: FieldSet) {
        let mut failing = self.failing_updates.lock().unwrap();
        *failing = *failing | fields;
    }

    pub fn heal(&self) {
        self.failing_inserts.lock().unwrap().clear();
        *self.failing_updates.lock().unwrap() = FieldSet::NONE;
    }

    fn refuse(what: &str) -> StoreError {
        StoreError::Io(format!("{what} refused"))
    }
}

impl RecordStore for FailingStore {
    fn insert(&self, record: &Record) -> Result<RecordId, StoreError> {
        if self.failing_inserts.lock().unwrap().contains(&record.kind()) {
            return Err(Self::refuse("insert"));
        }
        self.inner.insert(record)
    }

    fn update(&self, record: &Record, changed: FieldSet) -> Result<(), StoreError> {
        let failing = *self.failing_updates.lock().unwrap();
        if overlaps(failing, changed) {
            return Err(Self::refuse("update"));
        }
        self.inner.update(record, changed)
    }

    fn delete(&self, kind: RecordKind, id: RecordId) -> Result<(), StoreError> {
        self.inner.delete(kind, id)
    }

    fn query(&self, kind: RecordKind) -> Result<Vec<Record>, StoreError> {
        self.inner.query(kind)
    }
}

fn overlaps(a: FieldSet, b: FieldSet) -> bool {
    [
        FieldSet::REGISTRATION,
        FieldSet::LEASE_URL,
        FieldSet::LEASE,
        FieldSet::STATUS,
    ]
    .into_iter()
    .any(|field| a.contains(field) && b.contains(field))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertiserEvent {
    Started(Advertisement),
    Failed(RecordId, String),
}

#[derive(Default)]
pub struct RecordingAdvertiser {
    events: Mutex<Vec<AdvertiserEvent>>,
}

impl RecordingAdvertiser {
    pub fn events(&self) -> Vec<AdvertiserEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<AdvertiserEvent> {
        self.events.lock().unwrap().last().cloned()
    }
}

impl Advertiser for RecordingAdvertiser {
    fn start(&self, advertisement: Advertisement) {
        self.events
            .lock()
            .unwrap()
            .push(AdvertiserEvent::Started(advertisement));
    }

    fn start_failed(&self, beacon_id: RecordId, reason: &str) {
        self.events
            .lock()
            .unwrap()
            .push(AdvertiserEvent::Failed(beacon_id, reason.to_owned()));
    }
}

/// Key exchange whose first `zero_rounds` agreements yield the all-zero
/// secret.
pub struct DegenerateFirst {
    pub zero_rounds: usize,
    pub generated: usize,
}

impl KeyExchange for DegenerateFirst {
    fn generate_keypair(&mut self) -> KeyPair {
        self.generated += 1;
        generate_keypair()
    }

    fn agree(
        &self,
        server_public_key: &[u8],
        private_key: &[u8],
    ) -> Result<SharedSecret, eid_core::CryptoError> {
        if self.generated <= self.zero_rounds {
            Ok(SharedSecret::from_bytes([0; 32]))
        } else {
            agree(server_public_key, private_key)
        }
    }
}

/// One client wired to scripted collaborators.
pub struct Harness {
    pub ctx: BeaconContext,
    pub transport: Arc<ScriptedTransport>,
    pub local: Arc<ManualClock>,
    pub store: Arc<dyn RecordStore>,
    pub advertiser: RecordingAdvertiser,
    pub server: KeyPair,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn RecordStore>) -> Self {
        let transport = Arc::new(ScriptedTransport::default());
        let local = Arc::new(ManualClock::new(NOW_MS));
        let ctx = BeaconContext::new(
            ClientConfig::default(),
            transport.clone(),
            store.clone(),
            local.clone(),
        )
        .unwrap();
        Self {
            ctx,
            transport,
            local,
            store,
            advertiser: RecordingAdvertiser::default(),
            server: generate_keypair(),
        }
    }

    /// Harness holding a credential valid for an hour.
    pub fn signed_in() -> Self {
        let harness = Self::new();
        harness.sign_in_for(3600);
        harness
    }

    pub fn sign_in_for(&self, lifetime_secs: u64) {
        self.ctx
            .credentials
            .store(Credential::new("access-token", NOW + lifetime_secs))
            .unwrap();
    }

    pub fn script_params(&self) {
        self.transport.ok(
            Method::Get,
            "params",
            json!({ "serviceEcdhPublicKey": to_base64url(&self.server.public_key) }),
        );
    }

    pub fn script_accept(&self, server_id: &str) {
        self.transport.ok(
            Method::Post,
            "beacons",
            json!({ "id": server_id, "epoch": SERVER_EPOCH_US, "active": true }),
        );
    }

    /// Register a beacon with exponent 10 that the server accepts.
    pub async fn registered_beacon(&self, server_id: &str) -> BeaconRecord {
        self.script_params();
        self.script_accept(server_id);
        eid_client::register_beacon(
            &self.ctx,
            NewBeacon {
                rotation_exponent: Some(10),
                tag: None,
            },
            &self.advertiser,
        )
        .await
        .unwrap()
    }

    /// Identity key the server derives from a registration body.
    pub fn server_side_identity(&self, registration: &Value) -> IdentityKey {
        let beacon_pk: [u8; 32] = from_base64url_array(
            registration["beaconEcdhPublicKey"].as_str().unwrap(),
        )
        .unwrap();
        let secret = agree(&beacon_pk, &self.server.private_key).unwrap();
        derive_identity_key(&secret, &self.server.public_key, &beacon_pk).unwrap()
    }
}
