//! Advertising port: the radio driver that broadcasts a beacon.

use crate::store::RecordId;

/// What to put on air for one beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub beacon_id: RecordId,
    /// Encoded 13-character token for the current period.
    pub token: String,
    /// Short URL from the lease, or the prefixed token URL without one.
    pub url: String,
    /// Seconds until the token rotates.
    pub rotates_in: u64,
}

/// Receives start and failure notifications from the flows.
///
/// Calls are fire-and-forget; the driver owns retries and scheduling.
pub trait Advertiser: Send + Sync {
    fn start(&self, advertisement: Advertisement);

    fn start_failed(&self, beacon_id: RecordId, reason: &str);
}
