//! EID Client: provisioning and upkeep of rotating beacons.
//!
//! Builds on `eid-core` to register beacons with the resolving service,
//! keep their short URL leases fresh and hand ready-to-broadcast
//! advertisements to a radio driver.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`clock`] | Server clock offset |
//! | [`credential`] | Bearer credential cache with safety margin |
//! | [`store`] | Record persistence port, memory and JSON file stores |
//! | [`transport`] | Request/response port |
//! | [`api`] | Typed service calls and wire models |
//! | [`advertising`] | Radio driver port |
//! | [`beacon`] | Beacon records and leases |
//! | [`context`] | Shared state passed to every flow |
//! | [`session`] | Sign-in, sign-out, clock sync |
//! | [`registration`] | Beacon registration with rollback |
//! | [`lease`] | Lease refresh and the advertise entry point |
//! | [`inventory`] | Listing, deletion, server lookups |
//!
//! Flows are plain async functions taking a [`BeaconContext`]. Each issues
//! at most one outstanding request at a time; concurrency across beacons
//! comes from the caller running several flows at once.

pub mod advertising;
pub mod api;
pub mod beacon;
pub mod clock;
pub mod config;
pub mod context;
pub mod credential;
pub mod errors;
pub mod inventory;
pub mod lease;
pub mod registration;
pub mod session;
pub mod store;
pub mod transport;

pub use advertising::{Advertisement, Advertiser};
pub use beacon::{BeaconRecord, Lease, OperationalStatus, RegistrationState, RotatingBeacon};
pub use clock::{ClockSync, LocalClock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use context::BeaconContext;
pub use credential::{Credential, CredentialCache, CredentialState};
pub use errors::{ClientError, TransportError};
pub use inventory::{
    check_token, delete_beacon, fetch_remote_beacon, list_beacons, purge_unregistered,
    set_remote_active,
};
pub use lease::{attach_lease, on_advertise_enabled, refresh_due, refresh_lease, set_lease_ttl};
pub use registration::{register_beacon, register_beacon_with, NewBeacon};
pub use session::{sign_in, sign_out, sync_clock};
pub use store::{FileStore, MemoryStore, Record, RecordId, RecordKind, RecordStore};
pub use transport::{Endpoint, Method, Transport};
