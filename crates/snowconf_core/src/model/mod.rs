//! Domain model for stored configuration.
//!
//! # Invariants
//! - Every config item is identified by a generator-minted `ConfigId`.
//! - Scope names are validated before persistence.

pub mod config_item;
