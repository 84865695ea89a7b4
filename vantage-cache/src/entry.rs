//! Timed cache entries and size estimation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use vantage_core::{CacheError, Timestamp};

/// Size charged for an entry whose value could not be measured.
pub const DEFAULT_ENTRY_SIZE_BYTES: u64 = 64 * 1024;

/// A cached value with its timing and size metadata.
///
/// The value is shared behind an `Arc` and never mutated; writing a key again
/// replaces the whole entry.
#[derive(Debug)]
pub struct TimedEntry<T> {
    value: Arc<T>,
    created_at: Timestamp,
    last_accessed_at: Timestamp,
    expires_at: Timestamp,
    size_bytes: u64,
    /// Monotonic access counter; breaks LRU ties between equal timestamps.
    access_tick: u64,
}

impl<T> TimedEntry<T> {
    /// Create an entry stored at `now` that expires after `ttl`.
    pub fn new(value: Arc<T>, ttl: Duration, size_bytes: u64, now: Timestamp, tick: u64) -> Self {
        Self {
            value,
            created_at: now,
            last_accessed_at: now,
            expires_at: expiry_for(now, ttl),
            size_bytes,
            access_tick: tick,
        }
    }

    /// Shared handle to the stored value.
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> Timestamp {
        self.last_accessed_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub(crate) fn access_tick(&self) -> u64 {
        self.access_tick
    }

    /// An entry is logically absent once `now` is past its expiry.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, zero if already expired.
    pub fn remaining_ttl(&self, now: Timestamp) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Record an access.
    pub(crate) fn touch(&mut self, now: Timestamp, tick: u64) {
        self.last_accessed_at = now;
        self.access_tick = tick;
    }
}

/// `created + ttl`, saturating at the maximum representable time.
fn expiry_for(created: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| created.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Estimate a value's size as the length of its JSON encoding.
pub fn estimate_size<T: Serialize + ?Sized>(value: &T) -> Result<u64, CacheError> {
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, value).map_err(|e| CacheError::SizeEstimation {
        reason: e.to_string(),
    })?;
    Ok(counter.0)
}

/// Writer that only counts bytes.
struct ByteCounter(u64);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
