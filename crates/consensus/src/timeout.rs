//! Round timing.
//!
//! Rounds are not scheduled; they are derived from the wall clock and the
//! timestamp of the chain's last block:
//!
//! ```text
//! round = floor((now - last_block_timestamp) / round_timeout)
//! ```
//!
//! Every validator observing the same last block therefore agrees on the
//! round, and hence on the proposer, without exchanging timeout messages.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timing parameters of the round state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Length of one round
    pub round_timeout: Duration,
    /// Minimum time between a block and the next round 0
    pub min_block_interval: Duration,
    /// Period of the state machine's re-evaluation tick
    pub tick_interval: Duration,
    /// Length of one timeslot for the multi-view finality rule
    pub timeslot: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            round_timeout: Duration::from_secs(10),
            min_block_interval: Duration::from_secs(5),
            tick_interval: Duration::from_millis(100),
            timeslot: Duration::from_secs(10),
        }
    }
}

impl TimeoutConfig {
    /// Create a fast configuration for testing
    pub fn fast() -> Self {
        Self {
            round_timeout: Duration::from_secs(2),
            min_block_interval: Duration::from_millis(500),
            tick_interval: Duration::from_millis(20),
            timeslot: Duration::from_secs(2),
        }
    }

    /// Round reached after `elapsed` since the last block
    pub fn current_round(&self, elapsed: Duration) -> u64 {
        let timeout = self.round_timeout.as_millis().max(1);
        (elapsed.as_millis() / timeout) as u64
    }

    /// Round at wall-clock `now_ms` for a chain whose last block was stamped
    /// `last_block_timestamp` (unix seconds)
    pub fn round_at(&self, last_block_timestamp: i64, now_ms: i64) -> u64 {
        self.current_round(elapsed_since(last_block_timestamp, now_ms))
    }

    /// Whether the minimum block interval has passed since the last block
    pub fn min_interval_elapsed(&self, last_block_timestamp: i64, now_ms: i64) -> bool {
        elapsed_since(last_block_timestamp, now_ms) >= self.min_block_interval
    }

    /// Timeslot containing the unix-seconds timestamp `ts`
    pub fn timeslot_of(&self, ts: i64) -> i64 {
        timeslot_of(ts, self.timeslot)
    }
}

/// Timeslot containing the unix-seconds timestamp `ts` for slots of length `timeslot`
pub fn timeslot_of(ts: i64, timeslot: Duration) -> i64 {
    let slot_ms = (timeslot.as_millis() as i64).max(1);
    ts.saturating_mul(1000).div_euclid(slot_ms)
}

/// Time since the unix-seconds timestamp `since`, zero if it lies in the future
pub fn elapsed_since(since: i64, now_ms: i64) -> Duration {
    let elapsed = now_ms.saturating_sub(since.saturating_mul(1000));
    Duration::from_millis(elapsed.max(0) as u64)
}

/// Wall-clock time in unix milliseconds
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Wall-clock time in unix seconds
pub fn now_secs() -> i64 {
    now_millis() / 1000
}
