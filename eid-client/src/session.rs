//! Session operations: authentication and clock sync.

use crate::context::BeaconContext;
use crate::credential::Credential;
use crate::errors::ClientError;

/// Exchange an identity assertion for a bearer credential and cache it.
///
/// The credential expires `expires` seconds after the synchronized now.
///
/// # Errors
/// Transport failures, a malformed response (including a lifetime that
/// overflows the clock), or a store write failure.
pub async fn sign_in(ctx: &BeaconContext, assertion: &str) -> Result<Credential, ClientError> {
    let access = ctx.api.authenticate(assertion).await?;
    let expire_at = ctx.clock.now().checked_add(access.expires).ok_or_else(|| {
        ClientError::Malformed(format!("credential lifetime {}s out of range", access.expires))
    })?;
    let credential = Credential::new(access.access_token, expire_at);
    ctx.credentials.store(credential.clone())?;
    tracing::info!(expire_at = credential.expire_at, "signed in");
    Ok(credential)
}

/// Drop the cached credential.
///
/// # Errors
/// Propagates store write failures.
pub fn sign_out(ctx: &BeaconContext) -> Result<(), ClientError> {
    ctx.credentials.clear()?;
    tracing::info!("signed out");
    Ok(())
}

/// Fetch server time and update the clock offset. Returns the new offset
/// in milliseconds.
///
/// # Errors
/// Transport failures or a malformed response. The previous offset is kept.
pub async fn sync_clock(ctx: &BeaconContext) -> Result<i64, ClientError> {
    let server = ctx.api.server_clock().await?;
    ctx.clock
        .record_server_time(server.now, ctx.clock.local_millis());
    Ok(ctx.clock.offset_millis())
}
