//! Per-client failed PIN attempt tracking.
//!
//! A record is born on the first failed verification from a client, incremented by one
//! on each further failure and removed (never zeroed) on success. Once a client reaches
//! [`MAX_ATTEMPTS`] it is locked out until [`LOCKOUT_TIME`] has passed since its last
//! failure; the expired record is dropped on the next check or by [`AttemptTracker::sweep`].
//!
//! State is process-local. Every read-modify-write happens under one mutex so concurrent
//! requests from the same address cannot lose updates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};

pub const MAX_ATTEMPTS: u32 = 5;
pub const LOCKOUT_TIME: Duration = Duration::from_secs(15 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    count: u32,
    last_attempt_at: Instant,
}

/// Snapshot of one client's standing, as reported by `/api/pin-required`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptStatus {
    pub locked: bool,
    pub attempts_left: u32,
    pub lockout_minutes: u64,
}

pub struct AttemptTracker {
    records: Mutex<HashMap<String, AttemptRecord>>,
    clock: Arc<dyn Clock>,
}

/// Whole minutes left in a lockout, rounded up.
pub fn lockout_minutes(remaining: Duration) -> u64 {
    let ms = remaining.as_millis() as u64;
    ms.div_ceil(60_000)
}

impl AttemptTracker {
    pub fn new() -> Self { Self::with_clock(Arc::new(SystemClock)) }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { records: Mutex::new(HashMap::new()), clock }
    }

    /// Time left in the client's lockout, if it is locked out. An expired lockout is
    /// cleared as a side effect so the next attempt starts a fresh window.
    pub fn locked_for(&self, id: &str) -> Option<Duration> {
        let now = self.clock.now();
        let mut map = self.records.lock();
        Self::locked_for_locked(&mut map, id, now)
    }

    fn locked_for_locked(map: &mut HashMap<String, AttemptRecord>, id: &str, now: Instant) -> Option<Duration> {
        let rec = *map.get(id)?;
        if rec.count < MAX_ATTEMPTS { return None; }
        let elapsed = now.saturating_duration_since(rec.last_attempt_at);
        if elapsed < LOCKOUT_TIME {
            return Some(LOCKOUT_TIME - elapsed);
        }
        map.remove(id);
        debug!(client = id, "lockout expired");
        None
    }

    pub fn is_locked_out(&self, id: &str) -> bool { self.locked_for(id).is_some() }

    /// Count a failed verification. Returns the count after the increment.
    pub fn record_attempt(&self, id: &str) -> u32 {
        let now = self.clock.now();
        let mut map = self.records.lock();
        Self::bump(&mut map, id, now)
    }

    /// Check the lockout and reserve one attempt in a single critical section, before any
    /// comparison happens. `Err` carries the time left in an active lockout; `Ok` carries
    /// the count including the reservation. A successful verification must follow up with
    /// [`AttemptTracker::reset_attempts`].
    pub fn begin_attempt(&self, id: &str) -> Result<u32, Duration> {
        let now = self.clock.now();
        let mut map = self.records.lock();
        if let Some(remaining) = Self::locked_for_locked(&mut map, id, now) {
            return Err(remaining);
        }
        Ok(Self::bump(&mut map, id, now))
    }

    fn bump(map: &mut HashMap<String, AttemptRecord>, id: &str, now: Instant) -> u32 {
        let rec = map.entry(id.to_string()).or_insert(AttemptRecord { count: 0, last_attempt_at: now });
        rec.count += 1;
        rec.last_attempt_at = now;
        if rec.count >= MAX_ATTEMPTS {
            warn!(client = id, failures = rec.count, lockout_secs = LOCKOUT_TIME.as_secs(), "pin lockout triggered");
        } else {
            debug!(client = id, failures = rec.count, max = MAX_ATTEMPTS, "pin attempt counted");
        }
        rec.count
    }

    pub fn reset_attempts(&self, id: &str) { self.records.lock().remove(id); }

    /// Failed attempts currently on record for the client.
    pub fn attempts(&self, id: &str) -> u32 {
        self.records.lock().get(id).map(|r| r.count).unwrap_or(0)
    }

    pub fn status(&self, id: &str) -> AttemptStatus {
        let now = self.clock.now();
        let mut map = self.records.lock();
        let remaining = Self::locked_for_locked(&mut map, id, now);
        let count = map.get(id).map(|r| r.count).unwrap_or(0);
        AttemptStatus {
            locked: remaining.is_some(),
            attempts_left: MAX_ATTEMPTS.saturating_sub(count),
            lockout_minutes: remaining.map(lockout_minutes).unwrap_or(0),
        }
    }

    /// Remove every record whose last failure is older than the lockout window.
    /// Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.records.lock();
        let before = map.len();
        map.retain(|_, r| now.saturating_duration_since(r.last_attempt_at) < LOCKOUT_TIME);
        before - map.len()
    }

    pub fn len(&self) -> usize { self.records.lock().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Default for AttemptTracker {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
#[path = "attempts_tests.rs"]
mod tests;
