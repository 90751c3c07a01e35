//! Millisecond time sources for id generation.
//!
//! # Invariants
//! - `now_millis` returns Unix epoch milliseconds.
//! - Implementations may move backward; the generator detects that.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock milliseconds consulted on every mint.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Host wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        // A host clock set before 1970 reads as 0 and surfaces as a rollback.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}
