//! Clock sync: offset between the local clock and server time.
//!
//! The offset is a single atomic scalar: a reader sees either the old or
//! the new offset, never a mix. Before the first sync, [`ClockSync::now_millis`]
//! is the uncorrected local clock.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Local wall clock in UNIX epoch milliseconds.
pub trait LocalClock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// The operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    pub fn set_millis(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.millis.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

impl LocalClock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Process-wide synchronized clock.
pub struct ClockSync {
    local: Arc<dyn LocalClock>,
    offset_millis: AtomicI64,
    synced: AtomicBool,
}

impl ClockSync {
    pub fn new(local: Arc<dyn LocalClock>) -> Self {
        Self {
            local,
            offset_millis: AtomicI64::new(0),
            synced: AtomicBool::new(false),
        }
    }

    /// Uncorrected local time.
    pub fn local_millis(&self) -> u64 {
        self.local.now_millis()
    }

    /// Store `server - local` as the new offset.
    pub fn record_server_time(&self, server_epoch_millis: u64, local_epoch_millis_at_receipt: u64) {
        let offset = server_epoch_millis as i64 - local_epoch_millis_at_receipt as i64;
        self.offset_millis.store(offset, Ordering::Release);
        self.synced.store(true, Ordering::Release);
        tracing::debug!(offset_millis = offset, "clock offset updated");
    }

    pub fn offset_millis(&self) -> i64 {
        self.offset_millis.load(Ordering::Acquire)
    }

    /// True once a server time has been recorded this session.
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Server-corrected time in epoch milliseconds.
    pub fn now_millis(&self) -> u64 {
        let corrected = self.local.now_millis() as i64 + self.offset_millis();
        corrected.max(0) as u64
    }

    /// Server-corrected time in epoch seconds.
    pub fn now(&self) -> u64 {
        self.now_millis() / 1000
    }
}

impl std::fmt::Debug for ClockSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockSync")
            .field("offset_millis", &self.offset_millis())
            .field("synced", &self.is_synced())
            .finish()
    }
}
