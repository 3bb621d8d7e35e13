//! Lease refresh flow and the advertise entry point.
//!
//! A refresh asks the issuance service for one new short URL and swaps it
//! into the lease together with its deadline. A failed refresh keeps the
//! previous lease and marks the beacon `UpdateFailed`; nothing is rolled
//! back.
//!
//! [`refresh_lease`] always issues. Deciding whether a refresh is due is
//! the caller's job ([`refresh_due`]); [`on_advertise_enabled`] makes that
//! decision before broadcasting.

use eid_core::token::time_until_next_rotation;

use crate::advertising::{Advertisement, Advertiser};
use crate::api::IssueRequest;
use crate::beacon::{BeaconRecord, Lease, OperationalStatus, RotatingBeacon};
use crate::context::BeaconContext;
use crate::errors::ClientError;
use crate::store::{FieldSet, Record, RecordId};

/// True if the beacon has a lease that is missing its URL, stale, or
/// inside the refresh margin at the synchronized now.
pub fn refresh_due(ctx: &BeaconContext, beacon: &BeaconRecord) -> bool {
    beacon.lease().is_some_and(|lease| {
        lease.needs_refresh(ctx.clock.now_millis(), ctx.config.lease_refresh_margin_secs)
    })
}

/// Issue a new short URL for a beacon's lease and persist it.
///
/// # Errors
/// - `ClientError::BeaconNotFound` / `ClientError::NoLease`
/// - `ClientError::AuthExpired` without a valid credential
/// - transport, server and store failures, after marking the beacon
///   degraded; the previous lease is kept
pub async fn refresh_lease(ctx: &BeaconContext, beacon_id: RecordId) -> Result<Lease, ClientError> {
    let _guard = ctx.lock_beacon(beacon_id).await;
    let mut beacon = ctx.load_beacon(beacon_id)?;
    refresh_locked(ctx, &mut beacon).await
}

/// Refresh with the beacon's lock already held.
pub(crate) async fn refresh_locked(
    ctx: &BeaconContext,
    beacon: &mut BeaconRecord,
) -> Result<Lease, ClientError> {
    let lease = beacon
        .lease
        .clone()
        .ok_or(ClientError::NoLease(beacon.id))?;

    let renewal = async {
        let (url, expire_at) = issue(ctx, &lease).await?;
        let mut fresh = lease.clone();
        fresh.renew(url, expire_at);
        let mut renewed = beacon.clone();
        renewed.lease = Some(fresh.clone());
        let mut changed = FieldSet::LEASE_URL;
        if renewed.status == OperationalStatus::UpdateFailed {
            renewed.status = OperationalStatus::Idle;
            changed = changed | FieldSet::STATUS;
        }
        ctx.store.update(&Record::Beacon(renewed.clone()), changed)?;
        Ok::<_, ClientError>((renewed, fresh))
    }
    .await;

    match renewal {
        Ok((renewed, fresh)) => {
            *beacon = renewed;
            tracing::info!(beacon_id = beacon.id, expire_at = fresh.expire_at, "lease refreshed");
            Ok(fresh)
        }
        Err(err) => {
            beacon.mark_degraded();
            if let Err(store_err) = ctx
                .store
                .update(&Record::Beacon(beacon.clone()), FieldSet::STATUS)
            {
                tracing::warn!(beacon_id = beacon.id, error = %store_err, "could not persist degraded status");
            }
            tracing::warn!(beacon_id = beacon.id, error = %err, "lease refresh failed");
            Err(err)
        }
    }
}

async fn issue(ctx: &BeaconContext, lease: &Lease) -> Result<(String, u64), ClientError> {
    let auth = ctx.credentials.auth_header()?;
    let request = IssueRequest {
        token: lease.url_token.clone(),
        ttl: lease.time_to_live,
        num_to_issue: 1,
    };
    let issued = ctx
        .api
        .issue_short_urls(&auth, lease.url_id, &request)
        .await?;
    let short_url = issued
        .items
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::Malformed("issuance returned no short URL".into()))?;
    Ok((short_url.url, short_url.expire.unwrap_or(0)))
}

/// Prepare and start broadcasting one beacon.
///
/// Refreshes the lease first when one is due. On success the advertiser
/// receives [`Advertiser::start`] and the beacon becomes `Active`; on any
/// failure it receives [`Advertiser::start_failed`] and the error is
/// returned.
///
/// # Errors
/// See [`refresh_lease`]; also `ClientError::NotRegistered` and token
/// errors from a clock reading before the beacon epoch.
pub async fn on_advertise_enabled(
    ctx: &BeaconContext,
    beacon_id: RecordId,
    advertiser: &dyn Advertiser,
) -> Result<Advertisement, ClientError> {
    let _guard = ctx.lock_beacon(beacon_id).await;
    let mut beacon = match ctx.load_beacon(beacon_id) {
        Ok(beacon) => beacon,
        Err(err) => {
            advertiser.start_failed(beacon_id, &err.to_string());
            return Err(err);
        }
    };
    advertise_locked(ctx, &mut beacon, advertiser).await
}

pub(crate) async fn advertise_locked(
    ctx: &BeaconContext,
    beacon: &mut BeaconRecord,
    advertiser: &dyn Advertiser,
) -> Result<Advertisement, ClientError> {
    match prepare_advertisement(ctx, beacon).await {
        Ok(advertisement) => {
            tracing::info!(beacon_id = beacon.id, rotates_in = advertisement.rotates_in, "advertising");
            advertiser.start(advertisement.clone());
            Ok(advertisement)
        }
        Err(err) => {
            advertiser.start_failed(beacon.id, &err.to_string());
            Err(err)
        }
    }
}

async fn prepare_advertisement(
    ctx: &BeaconContext,
    beacon: &mut BeaconRecord,
) -> Result<Advertisement, ClientError> {
    if !beacon.is_registered() {
        return Err(ClientError::NotRegistered(beacon.id));
    }
    if refresh_due(ctx, beacon) {
        refresh_locked(ctx, beacon).await?;
    }

    let now = ctx.clock.now();
    let token = beacon.encoded_token(now)?;
    let rotates_in = time_until_next_rotation(beacon.epoch, beacon.rotation_exponent, now)?;
    let url = match beacon.lease().and_then(|l| l.short_url.clone()) {
        Some(url) => url,
        None => format!("{}{}", ctx.config.url_prefix, token),
    };

    if beacon.status != OperationalStatus::Active {
        beacon.status = OperationalStatus::Active;
        ctx.store
            .update(&Record::Beacon(beacon.clone()), FieldSet::STATUS)?;
    }

    Ok(Advertisement {
        beacon_id: beacon.id,
        token,
        url,
        rotates_in,
    })
}

/// Attach a short URL lease to a beacon, replacing any previous one.
///
/// # Errors
/// `ClientError::BeaconNotFound` or a store write failure.
pub async fn attach_lease(
    ctx: &BeaconContext,
    beacon_id: RecordId,
    url_id: u64,
    url_token: &str,
    time_to_live: u32,
) -> Result<(), ClientError> {
    let _guard = ctx.lock_beacon(beacon_id).await;
    let mut beacon = ctx.load_beacon(beacon_id)?;
    beacon.lease = Some(Lease::new(url_id, url_token, time_to_live));
    ctx.store
        .update(&Record::Beacon(beacon), FieldSet::LEASE)?;
    tracing::debug!(beacon_id, url_id, "lease attached");
    Ok(())
}

/// Change the lifetime of issued URLs. A changed TTL drops the current
/// short URL so the next advertise issues a new one. Returns whether
/// anything changed.
///
/// # Errors
/// `ClientError::BeaconNotFound`, `ClientError::NoLease` or a store write
/// failure.
pub async fn set_lease_ttl(
    ctx: &BeaconContext,
    beacon_id: RecordId,
    time_to_live: u32,
) -> Result<bool, ClientError> {
    let _guard = ctx.lock_beacon(beacon_id).await;
    let mut beacon = ctx.load_beacon(beacon_id)?;
    let lease = beacon
        .lease
        .as_mut()
        .ok_or(ClientError::NoLease(beacon_id))?;
    if lease.time_to_live == time_to_live {
        return Ok(false);
    }
    lease.time_to_live = time_to_live;
    lease.invalidate();
    ctx.store
        .update(&Record::Beacon(beacon), FieldSet::LEASE)?;
    tracing::debug!(beacon_id, time_to_live, "lease ttl changed");
    Ok(true)
}
