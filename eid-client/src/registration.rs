//! Beacon registration flow.
//!
//! ```text
//! KeysGenerated -> LocalRecordCreated -> ServerRoundTrip -> Committed
//!                                                        \-> RolledBack
//! ```
//!
//! The local record is written before the server round trip, so an
//! interrupted registration leaves an `Unregistered` record behind rather
//! than nothing. A failed round trip deletes that record and surfaces the
//! original error.

use eid_core::crypto::{KeyExchange, X25519};
use eid_core::encoding::to_base64url;
use eid_core::identity::establish_identity;
use eid_core::token::token_for_counter;

use crate::advertising::Advertiser;
use crate::api::RegisterBeacon;
use crate::beacon::BeaconRecord;
use crate::context::BeaconContext;
use crate::errors::ClientError;
use crate::lease::advertise_locked;
use crate::store::{FieldSet, Record, RecordKind};

/// Caller choices for a new beacon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBeacon {
    /// Falls back to the configured default.
    pub rotation_exponent: Option<u8>,
    pub tag: Option<String>,
}

/// Register a new rotating beacon and start advertising it.
///
/// # Errors
/// - `ClientError::AuthExpired` without a valid credential; nothing is sent
/// - transport, server, store and crypto failures, after rolling back the record
///
/// A failure to start advertising after the server accepted the beacon is
/// reported to the advertiser and logged, not returned.
///
/// The new record is locked in the same step that stores it, so a
/// concurrent `delete_beacon` or `purge_unregistered` waits for the
/// registration to commit or roll back.
pub async fn register_beacon(
    ctx: &BeaconContext,
    request: NewBeacon,
    advertiser: &dyn Advertiser,
) -> Result<BeaconRecord, ClientError> {
    register_beacon_with(ctx, &mut X25519, request, advertiser).await
}

/// [`register_beacon`] with an explicit key exchange.
///
/// # Errors
/// See [`register_beacon`].
pub async fn register_beacon_with<E: KeyExchange + Send + ?Sized>(
    ctx: &BeaconContext,
    exchange: &mut E,
    request: NewBeacon,
    advertiser: &dyn Advertiser,
) -> Result<BeaconRecord, ClientError> {
    let rotation_exponent = request
        .rotation_exponent
        .unwrap_or(ctx.config.default_rotation_exponent);

    let auth = ctx.credentials.auth_header()?;
    let params = ctx.api.registration_params(&auth).await?;
    let server_public_key = params.server_public_key()?;

    let provisioned = establish_identity(exchange, &server_public_key)?;
    let initial_token = token_for_counter(&provisioned.identity_key, 0);

    let mut beacon = BeaconRecord::unregistered(
        provisioned.identity_key,
        rotation_exponent,
        request.tag.clone(),
    );
    let (id, _guard) = ctx.insert_beacon_locked(&beacon).await?;
    beacon.id = id;
    tracing::debug!(beacon_id = beacon.id, "unregistered beacon record created");

    let submission = RegisterBeacon {
        service_ecdh_public_key: params.service_ecdh_public_key,
        beacon_ecdh_public_key: to_base64url(&provisioned.beacon_public_key),
        initial_eid: to_base64url(&initial_token),
        initial_clock_value: 0,
        rotation_period_exponent: rotation_exponent,
        tag: request.tag,
    };

    let committed = async {
        let remote = ctx.api.register_beacon(&auth, &submission).await?;
        let epoch = remote.epoch_seconds();
        beacon.commit(remote.id, epoch);
        ctx.store
            .update(&Record::Beacon(beacon.clone()), FieldSet::REGISTRATION)?;
        Ok::<_, ClientError>(())
    }
    .await;

    if let Err(err) = committed {
        roll_back(ctx, &beacon, &err);
        return Err(err);
    }
    tracing::info!(
        beacon_id = beacon.id,
        server_id = beacon.server_id.as_deref().unwrap_or_default(),
        epoch = beacon.epoch,
        "beacon registered"
    );

    if let Err(err) = advertise_locked(ctx, &mut beacon, advertiser).await {
        tracing::warn!(beacon_id = beacon.id, error = %err, "registered beacon did not start advertising");
    }
    Ok(beacon)
}

fn roll_back(ctx: &BeaconContext, beacon: &BeaconRecord, cause: &ClientError) {
    match ctx.store.delete(RecordKind::Beacon, beacon.id) {
        Ok(()) => {
            tracing::warn!(beacon_id = beacon.id, error = %cause, "registration failed, record rolled back")
        }
        Err(store_err) => tracing::warn!(
            beacon_id = beacon.id,
            error = %cause,
            store_error = %store_err,
            "registration failed and the record could not be deleted"
        ),
    }
    ctx.forget_beacon_lock(beacon.id);
}
