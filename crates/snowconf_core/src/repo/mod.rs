//! Repository layer contracts and SQLite implementations.
//!
//! # Responsibility
//! - Keep SQL details out of the service layer.
//! - Report semantic errors (`NotFound`, `Duplicate`) next to DB errors.

pub mod config_repo;
