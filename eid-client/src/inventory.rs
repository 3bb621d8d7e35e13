//! Beacon inventory: listing, deletion and server lookups.

use serde_json::json;

use crate::api::{RemoteBeacon, TokenInfo};
use crate::beacon::BeaconRecord;
use crate::context::BeaconContext;
use crate::errors::ClientError;
use crate::store::{RecordId, RecordKind};

/// All locally stored beacons, registered or not.
///
/// # Errors
/// Propagates store read failures.
pub fn list_beacons(ctx: &BeaconContext) -> Result<Vec<BeaconRecord>, ClientError> {
    ctx.beacons()
}

/// Delete a beacon record on user request. The server-side beacon is left
/// alone.
///
/// # Errors
/// `ClientError::BeaconNotFound` or a store write failure.
pub async fn delete_beacon(ctx: &BeaconContext, beacon_id: RecordId) -> Result<(), ClientError> {
    let _guard = ctx.lock_beacon(beacon_id).await;
    ctx.load_beacon(beacon_id)?;
    ctx.store.delete(RecordKind::Beacon, beacon_id)?;
    ctx.forget_beacon_lock(beacon_id);
    tracing::info!(beacon_id, "beacon deleted");
    Ok(())
}

/// Delete records left `Unregistered` by an interrupted registration.
/// Meant for startup, before any registration is in flight.
///
/// # Errors
/// Propagates store failures.
pub async fn purge_unregistered(ctx: &BeaconContext) -> Result<Vec<RecordId>, ClientError> {
    let mut purged = Vec::new();
    for beacon in ctx.beacons()?.into_iter().filter(|b| !b.is_registered()) {
        let _guard = ctx.lock_beacon(beacon.id).await;
        ctx.store.delete(RecordKind::Beacon, beacon.id)?;
        ctx.forget_beacon_lock(beacon.id);
        purged.push(beacon.id);
    }
    if !purged.is_empty() {
        tracing::info!(count = purged.len(), "purged unregistered beacons");
    }
    Ok(purged)
}

fn server_id(beacon: &BeaconRecord) -> Result<&str, ClientError> {
    beacon
        .server_id
        .as_deref()
        .ok_or(ClientError::NotRegistered(beacon.id))
}

/// The server's view of a registered beacon.
///
/// # Errors
/// `ClientError::NotRegistered`, `ClientError::AuthExpired`, or transport
/// and server failures.
pub async fn fetch_remote_beacon(
    ctx: &BeaconContext,
    beacon_id: RecordId,
) -> Result<RemoteBeacon, ClientError> {
    let beacon = ctx.load_beacon(beacon_id)?;
    let auth = ctx.credentials.auth_header()?;
    ctx.api.fetch_beacon(&auth, server_id(&beacon)?).await
}

/// Toggle whether the server resolves this beacon's tokens.
///
/// # Errors
/// See [`fetch_remote_beacon`].
pub async fn set_remote_active(
    ctx: &BeaconContext,
    beacon_id: RecordId,
    active: bool,
) -> Result<RemoteBeacon, ClientError> {
    let beacon = ctx.load_beacon(beacon_id)?;
    let auth = ctx.credentials.auth_header()?;
    ctx.api
        .update_beacon(&auth, server_id(&beacon)?, json!({ "active": active }))
        .await
}

/// Ask the server which beacon an encoded token belongs to.
///
/// # Errors
/// `ClientError::AuthExpired`, or transport and server failures.
pub async fn check_token(ctx: &BeaconContext, token: &str) -> Result<TokenInfo, ClientError> {
    let auth = ctx.credentials.auth_header()?;
    ctx.api.check_token(&auth, token).await
}
