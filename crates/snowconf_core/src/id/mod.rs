//! Unique record id generation.
//!
//! # Responsibility
//! - Mint 64-bit Snowflake-style ids for new records.
//! - Provide a process-wide generator and an injectable `IdSource` seam.
//!
//! # Invariants
//! - One mutex per generator serializes every mint.
//! - Clock rollback is an error, never compensated.

pub mod clock;
pub mod generator;
pub mod global;
pub mod machine;

pub use clock::{Clock, SystemClock};
pub use generator::{
    parse_id, validate_machine_id, IdError, IdGenerator, IdInfo, IdResult, IdSource, EPOCH_MILLIS,
    MAX_MACHINE_ID, MAX_SEQUENCE,
};
pub use global::{generate_id, global_generator, init_global_generator};
pub use machine::{default_machine_id, machine_id_from_ipv4};
