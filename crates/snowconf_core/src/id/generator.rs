//! Snowflake-style 64-bit id generator.
//!
//! # Responsibility
//! - Mint unique ids without a central allocator.
//! - Decode ids back into timestamp/machine/sequence for diagnostics.
//!
//! # Invariants
//! - Layout (msb first): 1 reserved bit, 41 bits of milliseconds since
//!   `EPOCH_MILLIS`, 10 bits of machine id, 12 bits of sequence.
//! - Ids from one instance are strictly increasing while the clock does not
//!   move backward.
//! - A backward clock fails the call and leaves state untouched.
//! - Sequence overflow within one millisecond waits for the next
//!   millisecond; it never wraps into a duplicate.
//! - The timestamp field covers `2^41` ms after `EPOCH_MILLIS` (until
//!   2092-09-06). Later readings are not representable.

use super::clock::{Clock, SystemClock};
use super::machine::default_machine_id;
use log::error;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

/// Reference epoch for the timestamp field: 2023-01-01T00:00:00Z.
pub const EPOCH_MILLIS: u64 = 1_672_531_200_000;

pub const TIMESTAMP_BITS: u32 = 41;
pub const MACHINE_ID_BITS: u32 = 10;
pub const SEQUENCE_BITS: u32 = 12;

/// Largest machine id that fits in `MACHINE_ID_BITS`.
pub const MAX_MACHINE_ID: u16 = (1 << MACHINE_ID_BITS) - 1;
/// Largest per-millisecond sequence value.
pub const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

/// Largest offset from `EPOCH_MILLIS` that fits in `TIMESTAMP_BITS`.
pub const MAX_TIMESTAMP_OFFSET: u64 = (1 << TIMESTAMP_BITS) - 1;

const MACHINE_ID_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + MACHINE_ID_BITS;

pub type IdResult<T> = Result<T, IdError>;

/// Id generation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Machine id does not fit in the 10-bit field. Construction time only.
    InvalidConfiguration { machine_id: i64, max: u16 },
    /// Wall clock reads earlier than the last millisecond used for minting.
    ClockRollback { current_ms: u64, last_ms: u64 },
}

impl Display for IdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfiguration { machine_id, max } => write!(
                f,
                "invalid machine id {machine_id}: expected a value between 0 and {max}"
            ),
            Self::ClockRollback {
                current_ms,
                last_ms,
            } => write!(
                f,
                "clock moved backwards; refusing to mint id (current={current_ms}ms, last={last_ms}ms)"
            ),
        }
    }
}

impl Error for IdError {}

/// Decoded view of an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdInfo {
    /// Absolute Unix epoch milliseconds (epoch offset added back).
    pub timestamp_millis: u64,
    pub machine_id: u16,
    pub sequence: u16,
}

impl Display for IdInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IdInfo{{timestamp={}, machine_id={}, sequence={}}}",
            self.timestamp_millis, self.machine_id, self.sequence
        )
    }
}

/// Decodes any 64-bit value using the id layout.
///
/// Values that were not minted by an `IdGenerator` decode without error but
/// carry no meaning.
pub fn parse_id(id: u64) -> IdInfo {
    IdInfo {
        timestamp_millis: (id >> TIMESTAMP_SHIFT) + EPOCH_MILLIS,
        machine_id: ((id >> MACHINE_ID_SHIFT) & u64::from(MAX_MACHINE_ID)) as u16,
        sequence: (id & u64::from(MAX_SEQUENCE)) as u16,
    }
}

fn compose_id(timestamp_ms: u64, machine_id: u16, sequence: u16) -> u64 {
    let offset = timestamp_ms - EPOCH_MILLIS;
    debug_assert!(
        offset <= MAX_TIMESTAMP_OFFSET,
        "timestamp {timestamp_ms}ms is past the 41-bit id range"
    );
    (offset << TIMESTAMP_SHIFT)
        | (u64::from(machine_id) << MACHINE_ID_SHIFT)
        | u64::from(sequence)
}

/// Anything that can hand out fresh record ids.
///
/// Write paths take an `IdSource` handle instead of reaching for the
/// process-wide generator directly.
pub trait IdSource {
    fn next_id(&self) -> IdResult<u64>;
}

struct MintState {
    last_timestamp: u64,
    sequence: u16,
}

/// Lock-protected id generator bound to one machine id.
pub struct IdGenerator<C: Clock = SystemClock> {
    machine_id: u16,
    clock: C,
    state: Mutex<MintState>,
}

impl IdGenerator<SystemClock> {
    /// Creates a generator for an explicit machine id.
    ///
    /// # Errors
    /// - `IdError::InvalidConfiguration` when `machine_id > MAX_MACHINE_ID`.
    pub fn new(machine_id: u16) -> IdResult<Self> {
        Self::with_clock(machine_id, SystemClock)
    }

    /// Creates a generator whose machine id is derived from the host address.
    ///
    /// Never fails. Hosts sharing the low 10 bits of their IPv4 address get
    /// the same machine id; pass an explicit id when that matters.
    pub fn with_default_machine_id() -> Self {
        Self::build(default_machine_id(), SystemClock)
    }
}

impl Default for IdGenerator<SystemClock> {
    fn default() -> Self {
        Self::with_default_machine_id()
    }
}

impl<C: Clock> IdGenerator<C> {
    /// Creates a generator reading time from `clock`.
    pub fn with_clock(machine_id: u16, clock: C) -> IdResult<Self> {
        validate_machine_id(i64::from(machine_id))?;
        Ok(Self::build(machine_id, clock))
    }

    fn build(machine_id: u16, clock: C) -> Self {
        Self {
            machine_id,
            clock,
            state: Mutex::new(MintState {
                // A first reading before the epoch is reported as a rollback.
                last_timestamp: EPOCH_MILLIS,
                sequence: 0,
            }),
        }
    }

    pub fn machine_id(&self) -> u16 {
        self.machine_id
    }

    /// Mints the next id.
    ///
    /// Holds the instance lock for the whole read-modify-write, including a
    /// spin wait when the 4096 sequence values of a millisecond are used up.
    ///
    /// # Errors
    /// - `IdError::ClockRollback` when the clock reads earlier than the last
    ///   millisecond used. State is not modified.
    pub fn next_id(&self) -> IdResult<u64> {
        // State is written only after every check passes, so a poisoned lock
        // still guards consistent values.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut timestamp = self.clock.now_millis();
        if timestamp < state.last_timestamp {
            error!(
                "event=id_mint module=id status=error error_code=clock_rollback machine_id={} current_ms={} last_ms={}",
                self.machine_id, timestamp, state.last_timestamp
            );
            return Err(IdError::ClockRollback {
                current_ms: timestamp,
                last_ms: state.last_timestamp,
            });
        }

        let sequence = if timestamp == state.last_timestamp {
            let next = (state.sequence + 1) & MAX_SEQUENCE;
            if next == 0 {
                timestamp = self.wait_next_millis(state.last_timestamp);
            }
            next
        } else {
            0
        };

        state.last_timestamp = timestamp;
        state.sequence = sequence;

        Ok(compose_id(timestamp, self.machine_id, sequence))
    }

    /// Decodes an id. Same as the free function [`parse_id`].
    pub fn parse_id(&self, id: u64) -> IdInfo {
        parse_id(id)
    }

    fn wait_next_millis(&self, last_timestamp: u64) -> u64 {
        let mut timestamp = self.clock.now_millis();
        while timestamp <= last_timestamp {
            std::hint::spin_loop();
            timestamp = self.clock.now_millis();
        }
        timestamp
    }
}

/// Checks that a raw machine id fits in the 10-bit field.
///
/// Accepts signed input so callers parsing untrusted text can report
/// negative values through the same error.
pub fn validate_machine_id(machine_id: i64) -> IdResult<u16> {
    match u16::try_from(machine_id) {
        Ok(value) if value <= MAX_MACHINE_ID => Ok(value),
        _ => Err(IdError::InvalidConfiguration {
            machine_id,
            max: MAX_MACHINE_ID,
        }),
    }
}

impl<C: Clock> IdSource for IdGenerator<C> {
    fn next_id(&self) -> IdResult<u64> {
        IdGenerator::next_id(self)
    }
}

impl<T: IdSource + ?Sized> IdSource for &T {
    fn next_id(&self) -> IdResult<u64> {
        (**self).next_id()
    }
}

impl<T: IdSource + ?Sized> IdSource for Arc<T> {
    fn next_id(&self) -> IdResult<u64> {
        (**self).next_id()
    }
}
